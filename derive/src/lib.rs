//! Derive macro for `InnerSerialize`.
use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{
    parse_macro_input, parse_quote, spanned::Spanned, Data, DeriveInput, Fields, GenericParam,
    Generics,
};

/// Derive macro that implements the `InnerSerialize` trait for a struct with named fields.  Fields
/// are serialized in declaration order.  Using this macro requires that `InnerSerialize` and
/// `Error` are locally `use`d.
#[proc_macro_derive(LegacySerialize)]
pub fn derive_legacy_serialize(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_legacy_serialize_internal(&input)
}

fn derive_legacy_serialize_internal(input: &DeriveInput) -> proc_macro::TokenStream {
    let name = &input.ident;

    // Add a bound `T: InnerSerialize` for every type parameter `T`.
    let generics = add_trait_bounds(&input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let deserialize = deserialize_struct(&input.data);
    let serialize = serialize_struct(&input.data);

    let expanded = quote! {
        // The generated impl
        impl #impl_generics InnerSerialize for #name #ty_generics #where_clause {
            fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
                #deserialize
            }
            fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
                #serialize
            }
        }
    };

    expanded.into()
}

/// Add a bound `T: InnerSerialize` for every type parameter `T`.
fn add_trait_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    for param in &mut generics.params {
        if let GenericParam::Type(ref mut type_param) = *param {
            type_param.bounds.push(parse_quote!(InnerSerialize));
        }
    }
    generics
}

/// Generate code to deserialize each field in turn from the front of `data`.
fn deserialize_struct(data: &Data) -> TokenStream {
    match data {
        Data::Struct(ref data) => {
            match data.fields {
                Fields::Named(ref fields) => {
                    // Expands to code like
                    //
                    //     let (x, __rest) = <XType as InnerSerialize>::deserialize(data)?;
                    //     let (y, __rest) = <YType as InnerSerialize>::deserialize(__rest)?;
                    //     Ok((Self { x, y }, __rest))
                    //
                    let recurse = fields.named.iter().map(|f| {
                        let name = &f.ident;
                        let typ = &f.ty;
                        quote_spanned! {f.span()=>
                            let (#name, __rest) = <#typ as InnerSerialize>::deserialize(__rest)?;
                        }
                    });
                    let names = fields.named.iter().map(|f| &f.ident);
                    quote! {
                        let __rest = data;
                        #(#recurse)*
                        Ok((Self { #(#names, )* }, __rest))
                    }
                }
                Fields::Unnamed(_) | Fields::Unit => unimplemented!(),
            }
        }
        Data::Enum(_) | Data::Union(_) => unimplemented!(),
    }
}

/// Generate code to serialize each field in turn onto the end of `buf`.
fn serialize_struct(data: &Data) -> TokenStream {
    match data {
        Data::Struct(ref data) => {
            match data.fields {
                Fields::Named(ref fields) => {
                    // Expands to code like
                    //
                    //     <XType as InnerSerialize>::serialize_into(&self.x, buf)?;
                    //     <YType as InnerSerialize>::serialize_into(&self.y, buf)?;
                    //     Ok(())
                    //
                    // using fully qualified syntax so that inherent methods of the same name are
                    // not picked up.
                    let recurse = fields.named.iter().map(|f| {
                        let name = &f.ident;
                        let typ = &f.ty;
                        quote_spanned! {f.span()=>
                            <#typ as InnerSerialize>::serialize_into(&self.#name, buf)?;
                        }
                    });
                    quote! {
                        #(#recurse)*
                        Ok(())
                    }
                }
                Fields::Unnamed(_) | Fields::Unit => unimplemented!(),
            }
        }
        Data::Enum(_) | Data::Union(_) => unimplemented!(),
    }
}
