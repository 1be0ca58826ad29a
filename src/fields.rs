//! Field-group layout metadata.
//!
//! A [`FieldGroups`] table names contiguous sub-regions of a host object so
//! an on-heap store can be laid over one of them
//! ([`HeapStore::over_group`](crate::store::HeapStore::over_group)),
//! giving a zero-copy binary view of structured data.
//!
//! The table is built from explicit `(offset, width)` field descriptors —
//! typically produced with `core::mem::offset_of!` over a `#[repr(C)]`
//! type — sorted by offset. A group is the contiguous run of fields
//! carrying the same group name; once another group starts, a later field
//! reusing an earlier name does *not* reopen it.
//!
//! Tables are memoised per host type through [`FieldGroups::lookup`].

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::error::{BytesError, Result};

/// One primitive field of the host type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name, for diagnostics.
    pub name: &'static str,
    /// Group the field belongs to; `None` for ungrouped fields.
    pub group: Option<&'static str>,
    /// Byte offset within the host object.
    pub offset: u64,
    /// Field width in bytes: 1, 2, 4 or 8.
    pub width: u32,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: u64,
    end: u64,
}

/// Collects field descriptors and derives the group table.
#[derive(Debug, Default)]
pub struct FieldGroupsBuilder {
    fields: Vec<FieldDescriptor>,
}

impl FieldGroupsBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an ungrouped field. It still participates in the schema
    /// fingerprint.
    #[must_use]
    pub fn field(mut self, name: &'static str, offset: u64, width: u32) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            group: None,
            offset,
            width,
        });
        self
    }

    /// Adds a field belonging to `group`.
    #[must_use]
    pub fn grouped(
        mut self,
        name: &'static str,
        group: &'static str,
        offset: u64,
        width: u32,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            group: Some(group),
            offset,
            width,
        });
        self
    }

    /// Derives the group table: fields are sorted by offset, contiguous
    /// same-group runs become spans, and the description word fingerprints
    /// the field census.
    pub fn build(mut self) -> Result<FieldGroups> {
        self.fields.sort_by_key(|f| f.offset);

        let mut groups: Vec<(&'static str, Span)> = Vec::new();
        let mut open: Option<&'static str> = None;
        let mut longs = 0u32;
        let mut ints = 0u32;
        let mut shorts = 0u32;
        let mut bytes = 0u32;

        for field in &self.fields {
            match field.width {
                1 => bytes += 1,
                2 => shorts += 1,
                4 => ints += 1,
                8 => longs += 1,
                w => {
                    return Err(BytesError::InvalidArgument(format!(
                        "field {} has unsupported width {w}",
                        field.name
                    )))
                }
            }
            let span_end = field.offset + u64::from(field.width);
            match field.group {
                Some(group) if open == Some(group) => {
                    // Extend the open run.
                    let entry = groups
                        .iter_mut()
                        .find(|(name, _)| *name == group)
                        .unwrap_or_else(|| unreachable!("open group must be registered"));
                    entry.1.end = span_end;
                }
                Some(group) => {
                    if groups.iter().any(|(name, _)| *name == group) {
                        // A closed group does not reopen.
                        open = None;
                    } else {
                        groups.push((
                            group,
                            Span {
                                start: field.offset,
                                end: span_end,
                            },
                        ));
                        open = Some(group);
                    }
                }
                None => {}
            }
        }

        if longs > 255 || ints > 255 || shorts > 255 || bytes > 255 {
            return Err(BytesError::InvalidArgument(
                "more than 255 fields of one width".into(),
            ));
        }
        let mut description = (longs << 24) | (ints << 16) | (shorts << 8) | bytes;
        if description.count_ones() % 2 == 0 {
            description |= 0x8000;
        }

        Ok(FieldGroups {
            groups,
            description: description as i32,
        })
    }
}

/// Ordered mapping of group name to `[start, end)` span within a host
/// object, plus a one-word schema fingerprint.
#[derive(Debug)]
pub struct FieldGroups {
    groups: Vec<(&'static str, Span)>,
    description: i32,
}

impl FieldGroups {
    /// Start offset of `group` relative to the host object.
    pub fn start_of(&self, group: &str) -> Result<u64> {
        self.span(group).map(|s| s.start)
    }

    /// Length in bytes of `group`.
    pub fn length_of(&self, group: &str) -> Result<u64> {
        self.span(group).map(|s| s.end - s.start)
    }

    /// Group names in layout order.
    pub fn group_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.groups.iter().map(|(name, _)| *name)
    }

    /// Schema fingerprint: counts of 8/4/2/1-byte fields packed into one
    /// word, with bit 15 forcing odd parity.
    #[must_use]
    pub fn description(&self) -> i32 {
        self.description
    }

    /// Human-readable layout summary.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::from("groups {");
        for (i, (name, span)) in self.groups.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, " {name}: {} to {}", span.start, span.end);
        }
        out.push_str(" }");
        out
    }

    /// The memoised table for host type `T`, built on first use.
    pub fn lookup<T: GroupLayout>() -> Arc<Self> {
        static CACHE: OnceLock<Mutex<HashMap<TypeId, Arc<FieldGroups>>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = cache.lock();
        Arc::clone(
            map.entry(TypeId::of::<T>())
                .or_insert_with(|| Arc::new(T::field_groups())),
        )
    }

    fn span(&self, group: &str) -> Result<Span> {
        self.groups
            .iter()
            .find(|(name, _)| *name == group)
            .map(|(_, span)| *span)
            .ok_or_else(|| BytesError::InvalidArgument(format!("no field group named {group}")))
    }
}

/// Implemented by host types that publish a field-group layout.
pub trait GroupLayout: 'static {
    /// Builds the type's group table. Called once; the result is memoised
    /// by [`FieldGroups::lookup`].
    fn field_groups() -> FieldGroups;
}
