//! Ordered collection of authorization parameters.
//!
//! Blob values (`BYTES` and `BIGNUM` kinds) are not held inline; each blob entry records an
//! `(offset, len)` range into a single indirect data arena owned by the set, and the range is
//! re-checked whenever the entry is read.
//!
//! Serialized form (all integers little-endian):
//!
//! ```text
//! [u32 indirect_size][indirect data]
//! [u32 count][u32 elements_size]
//!   count * [u32 tag][value]
//! ```
//!
//! where the value is a `u32` for `ENUM`/`ENUM_REP`/`INT`/`INT_REP`, a `u64` for `LONG`/`DATE`, a
//! `u8` for `BOOL`, and `[u32 len][u32 offset]` for `BIGNUM`/`BYTES`.

use crate::tag::{tag_type, Param, RepeatableTag, SingleTag, Tag, TagType, Value};
use alloc::vec::Vec;
use log::warn;

/// Validity state of an [`AuthorizationSet`].  Once a set leaves `Ok` it stays there until it is
/// reinitialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Ok,
    AllocationFailure,
    MalformedData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stored {
    Enum(u32),
    Int(u32),
    Long(u64),
    Date(u64),
    Bool(bool),
    Blob { offset: usize, len: usize },
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    /// Raw tag value.  Tags missing from [`Tag`] are kept so that they survive a round trip, but
    /// are not visible through typed access.
    tag: u32,
    value: Stored,
}

/// Fixed storage limits for a non-growable set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Capacity {
    elems: usize,
    indirect: usize,
}

#[derive(Clone, Default)]
pub struct AuthorizationSet {
    elems: Vec<Entry>,
    indirect: Vec<u8>,
    fixed: Option<Capacity>,
    status: Status,
}

/// Size of the serialized `[u32 tag][value]` for one element of the given kind.
fn serialized_elem_size(kind: TagType) -> usize {
    4 + match kind {
        TagType::Invalid => 0,
        TagType::Enum | TagType::EnumRep | TagType::Int | TagType::IntRep => 4,
        TagType::Long | TagType::Date => 8,
        TagType::Bool => 1,
        TagType::Bignum | TagType::Bytes => 8,
    }
}

fn take<'a>(data: &mut &'a [u8], len: usize) -> Option<&'a [u8]> {
    if data.len() < len {
        return None;
    }
    let (head, rest) = data.split_at(len);
    *data = rest;
    Some(head)
}

fn take_u8(data: &mut &[u8]) -> Option<u8> {
    take(data, 1).map(|b| b[0])
}

fn take_u32(data: &mut &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = take(data, 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn take_u64(data: &mut &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = take(data, 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

impl AuthorizationSet {
    /// Create an empty, growable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding copies of the given parameters.  The result must be checked with
    /// [`AuthorizationSet::is_valid`].
    pub fn from_params(params: &[Param]) -> Self {
        let mut set = Self::new();
        set.reinitialize(params);
        set
    }

    /// Create a set whose storage never grows beyond `elems` entries and `indirect` bytes of
    /// blob data.
    pub fn with_fixed_capacity(elems: usize, indirect: usize) -> Self {
        let mut set = Self::new();
        if set.elems.try_reserve_exact(elems).is_err()
            || set.indirect.try_reserve_exact(indirect).is_err()
        {
            set.set_invalid(Status::AllocationFailure);
            return set;
        }
        set.fixed = Some(Capacity { elems, indirect });
        set
    }

    /// Create a set from its serialized form.  The result must be checked with
    /// [`AuthorizationSet::is_valid`].
    pub fn from_slice(data: &[u8]) -> Self {
        let mut set = Self::new();
        let mut data = data;
        set.deserialize_from(&mut data);
        set
    }

    /// Replace the contents of the set with copies of the given parameters, clearing any error
    /// state.  Either every parameter is copied or the set ends up empty and invalid.
    pub fn reinitialize(&mut self, params: &[Param]) -> bool {
        self.elems.clear();
        self.indirect.clear();
        self.status = Status::Ok;

        let blob_size = params.iter().map(|p| p.blob_len()).sum();
        if !self.reserve_elems(params.len()) || !self.reserve_indirect(blob_size) {
            self.set_invalid(Status::AllocationFailure);
            return false;
        }
        for param in params {
            self.push_entry(*param);
        }
        true
    }

    pub fn is_valid(&self) -> Status {
        self.status
    }

    fn set_invalid(&mut self, status: Status) {
        self.elems = Vec::new();
        self.indirect = Vec::new();
        self.status = status;
    }

    /// Make room for `additional` more entries.
    pub fn reserve_elems(&mut self, additional: usize) -> bool {
        if self.status != Status::Ok {
            return false;
        }
        if let Some(cap) = self.fixed {
            return self.elems.len().saturating_add(additional) <= cap.elems;
        }
        if self.elems.try_reserve(additional).is_err() {
            self.set_invalid(Status::AllocationFailure);
            return false;
        }
        true
    }

    /// Make room for `additional` more bytes of blob data.
    pub fn reserve_indirect(&mut self, additional: usize) -> bool {
        if self.status != Status::Ok {
            return false;
        }
        if let Some(cap) = self.fixed {
            return self.indirect.len().saturating_add(additional) <= cap.indirect;
        }
        if self.indirect.try_reserve(additional).is_err() {
            self.set_invalid(Status::AllocationFailure);
            return false;
        }
        true
    }

    /// Append a parameter.  Returns false, leaving existing entries untouched, if there is no room
    /// for it.
    pub fn push_back(&mut self, param: Param) -> bool {
        if !self.reserve_elems(1) || !self.reserve_indirect(param.blob_len()) {
            return false;
        }
        self.push_entry(param);
        true
    }

    /// Append every entry of `other`, copying its blobs into this set's own arena.  Nothing
    /// is appended if there is not room for all of them.
    pub fn push_back_set(&mut self, other: &AuthorizationSet) -> bool {
        if !self.reserve_elems(other.len()) || !self.reserve_indirect(other.indirect.len()) {
            return false;
        }
        for (tag, value) in other.raw_entries() {
            self.push_raw(tag, value);
        }
        true
    }

    /// Append a parameter; room must already have been reserved.
    fn push_entry(&mut self, param: Param) {
        self.push_raw(param.tag() as u32, param.value());
    }

    fn push_raw(&mut self, tag: u32, value: Value) {
        let value = match value {
            Value::Enum(v) => Stored::Enum(v),
            Value::Int(v) => Stored::Int(v),
            Value::Long(v) => Stored::Long(v),
            Value::Date(v) => Stored::Date(v),
            Value::Bool(v) => Stored::Bool(v),
            Value::Bytes(data) => {
                let offset = self.indirect.len();
                self.indirect.extend_from_slice(data);
                Stored::Blob { offset, len: data.len() }
            }
        };
        self.elems.push(Entry { tag, value });
    }

    /// Number of entries; an invalid set is empty.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Number of bytes of blob data held by the set.
    pub fn indirect_size(&self) -> usize {
        self.indirect.len()
    }

    /// Index of the first entry after `after` (or of the first entry, if `after` is `None`) that
    /// has the given tag.
    pub fn find(&self, tag: Tag, after: Option<usize>) -> Option<usize> {
        let start = match after {
            Some(idx) => idx.checked_add(1)?,
            None => 0,
        };
        let raw = tag as u32;
        self.elems.iter().enumerate().skip(start).find(|(_, e)| e.tag == raw).map(|(idx, _)| idx)
    }

    /// Indicate whether any entry has the given tag.
    pub fn contains_tag(&self, tag: Tag) -> bool {
        self.find(tag, None).is_some()
    }

    /// Indicate whether the set holds an entry equal to `param`.
    pub fn contains(&self, param: &Param) -> bool {
        self.iter().any(|p| p == *param)
    }

    /// Entry at `index`, or `None` if out of range or if the entry's tag is not a known [`Tag`].
    pub fn get(&self, index: usize) -> Option<Param<'_>> {
        let entry = self.elems.get(index)?;
        let tag = Tag::n(entry.tag)?;
        Some(Param::new_unchecked(tag, self.value_of(entry)?))
    }

    fn value_of(&self, entry: &Entry) -> Option<Value<'_>> {
        let value = match entry.value {
            Stored::Enum(v) => Value::Enum(v),
            Stored::Int(v) => Value::Int(v),
            Stored::Long(v) => Value::Long(v),
            Stored::Date(v) => Value::Date(v),
            Stored::Bool(v) => Value::Bool(v),
            Stored::Blob { offset, len } => {
                Value::Bytes(self.indirect.get(offset..offset.checked_add(len)?)?)
            }
        };
        Some(value)
    }

    /// Entries with known tags, in order.
    pub fn iter(&self) -> impl Iterator<Item = Param<'_>> {
        (0..self.elems.len()).filter_map(move |idx| self.get(idx))
    }

    /// Every entry in order as a raw `(tag, value)` pair, including those with unknown tags.
    fn raw_entries(&self) -> impl Iterator<Item = (u32, Value<'_>)> {
        self.elems.iter().filter_map(move |e| Some((e.tag, self.value_of(e)?)))
    }

    /// Value of a single-valued tag.
    pub fn get_tag_value<T: SingleTag>(&self, tag: T) -> Option<T::Value<'_>> {
        let idx = self.find(tag.tag(), None)?;
        tag.decode(self.get(idx)?.value())
    }

    /// Value of the `instance`-th occurrence of a repeatable tag.
    pub fn get_tag_value_at<T: RepeatableTag>(
        &self,
        tag: T,
        instance: usize,
    ) -> Option<T::Value<'_>> {
        let mut pos = None;
        for _ in 0..=instance {
            pos = Some(self.find(tag.tag(), pos)?);
        }
        tag.decode(self.get(pos?)?.value())
    }

    fn serialized_elements_size(&self) -> usize {
        self.elems.iter().map(|e| serialized_elem_size(tag_type(e.tag))).sum()
    }

    /// Size of the serialized form of the set.
    pub fn serialized_size(&self) -> usize {
        4 + self.indirect.len() + 4 + 4 + self.serialized_elements_size()
    }

    /// Append the serialized form of the set to `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Status> {
        buf.try_reserve(self.serialized_size()).map_err(|_e| Status::AllocationFailure)?;
        buf.extend_from_slice(&(self.indirect.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.indirect);
        buf.extend_from_slice(&(self.elems.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.serialized_elements_size() as u32).to_le_bytes());
        for entry in &self.elems {
            buf.extend_from_slice(&entry.tag.to_le_bytes());
            match entry.value {
                Stored::Enum(v) | Stored::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
                Stored::Long(v) | Stored::Date(v) => buf.extend_from_slice(&v.to_le_bytes()),
                Stored::Bool(v) => buf.push(v as u8),
                Stored::Blob { offset, len } => {
                    buf.extend_from_slice(&(len as u32).to_le_bytes());
                    buf.extend_from_slice(&(offset as u32).to_le_bytes());
                }
            }
        }
        Ok(())
    }

    /// Replace the contents of the set with the serialized set at the front of `data`, advancing
    /// `data` past the consumed bytes.  On failure the set is left empty in the `MalformedData`
    /// (or `AllocationFailure`) state.
    pub fn deserialize_from(&mut self, data: &mut &[u8]) -> bool {
        self.elems = Vec::new();
        self.indirect = Vec::new();
        self.fixed = None;
        self.status = Status::Ok;
        match self.deserialize_inner(data) {
            Ok(()) => true,
            Err(status) => {
                warn!("failed to deserialize authorization set: {:?}", status);
                self.set_invalid(status);
                false
            }
        }
    }

    fn deserialize_inner(&mut self, data: &mut &[u8]) -> Result<(), Status> {
        let indirect_size = take_u32(data).ok_or(Status::MalformedData)? as usize;
        let indirect = take(data, indirect_size).ok_or(Status::MalformedData)?;
        self.indirect.try_reserve(indirect_size).map_err(|_e| Status::AllocationFailure)?;
        self.indirect.extend_from_slice(indirect);

        let count = take_u32(data).ok_or(Status::MalformedData)? as usize;
        let elements_size = take_u32(data).ok_or(Status::MalformedData)? as usize;
        // Every element takes at least 4 bytes, which bounds the allocation below.
        if count.checked_mul(4).map_or(true, |min| min > elements_size) {
            return Err(Status::MalformedData);
        }
        let mut elements = take(data, elements_size).ok_or(Status::MalformedData)?;
        self.elems.try_reserve(count).map_err(|_e| Status::AllocationFailure)?;

        let mut blob_total: usize = 0;
        for _ in 0..count {
            let tag = take_u32(&mut elements).ok_or(Status::MalformedData)?;
            let value = match tag_type(tag) {
                TagType::Invalid => return Err(Status::MalformedData),
                TagType::Enum | TagType::EnumRep => {
                    Stored::Enum(take_u32(&mut elements).ok_or(Status::MalformedData)?)
                }
                TagType::Int | TagType::IntRep => {
                    Stored::Int(take_u32(&mut elements).ok_or(Status::MalformedData)?)
                }
                TagType::Long => {
                    Stored::Long(take_u64(&mut elements).ok_or(Status::MalformedData)?)
                }
                TagType::Date => {
                    Stored::Date(take_u64(&mut elements).ok_or(Status::MalformedData)?)
                }
                TagType::Bool => {
                    Stored::Bool(take_u8(&mut elements).ok_or(Status::MalformedData)? != 0)
                }
                TagType::Bignum | TagType::Bytes => {
                    let len = take_u32(&mut elements).ok_or(Status::MalformedData)? as usize;
                    let offset = take_u32(&mut elements).ok_or(Status::MalformedData)? as usize;
                    match offset.checked_add(len) {
                        Some(end) if end <= indirect_size => {}
                        _ => return Err(Status::MalformedData),
                    }
                    blob_total = blob_total.checked_add(len).ok_or(Status::MalformedData)?;
                    Stored::Blob { offset, len }
                }
            };
            self.elems.push(Entry { tag, value });
        }
        if !elements.is_empty() {
            return Err(Status::MalformedData);
        }
        // Blob ranges must account for exactly the whole of the indirect data.  Overlapping
        // ranges whose lengths still add up are not detected.
        if blob_total != indirect_size {
            return Err(Status::MalformedData);
        }
        Ok(())
    }
}

impl PartialEq for AuthorizationSet {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status
            && self.len() == other.len()
            && self.raw_entries().eq(other.raw_entries())
    }
}

impl Eq for AuthorizationSet {}

impl core::fmt::Debug for AuthorizationSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.status != Status::Ok {
            return write!(f, "AuthorizationSet({:?})", self.status);
        }
        let mut list = f.debug_list();
        for (raw, value) in self.raw_entries() {
            match Tag::n(raw) {
                Some(tag) => list.entry(&Param::new_unchecked(tag, value)),
                None => list.entry(&format_args!("Unknown({:#010x}, {:?})", raw, value)),
            };
        }
        list.finish()
    }
}

impl<'a> FromIterator<Param<'a>> for AuthorizationSet {
    fn from_iter<I: IntoIterator<Item = Param<'a>>>(iter: I) -> Self {
        let mut set = Self::new();
        for param in iter {
            if !set.push_back(param) {
                break;
            }
        }
        set
    }
}
