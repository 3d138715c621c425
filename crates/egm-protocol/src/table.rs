use crate::codec::{decode_as, leading_id};
use crate::report::Report;
use egm_core::{Error, ReportId, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

type DecodeFn = fn(&[u8]) -> Result<Box<dyn Any + Send>>;

fn decode_boxed<R: Report>(frame: &[u8]) -> Result<Box<dyn Any + Send>> {
    Ok(Box::new(decode_as::<R>(frame)?))
}

#[derive(Clone, Copy)]
struct Entry {
    name: &'static str,
    type_id: TypeId,
    decode: DecodeFn,
}

/// Catalog mapping report ids to the report types a device family emits.
///
/// # Example
///
/// ```
/// use egm_protocol::ReportTable;
/// use egm_protocol::reports::{CoinFaultStatus, CoinInStatus};
///
/// let table = ReportTable::new()
///     .with::<CoinInStatus>()
///     .with::<CoinFaultStatus>();
///
/// assert_eq!(table.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct ReportTable {
    entries: HashMap<ReportId, Entry>,
}

impl ReportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ReportTable::insert`].
    pub fn with<R: Report>(mut self) -> Self {
        self.insert::<R>();
        self
    }

    /// Bind `R::ID` to `R`. Returns `true` if the id was not bound before.
    ///
    /// Rebinding an id to a different type replaces the old binding.
    pub fn insert<R: Report>(&mut self) -> bool {
        let entry = Entry {
            name: R::NAME,
            type_id: TypeId::of::<R>(),
            decode: decode_boxed::<R>,
        };

        match self.entries.insert(R::ID, entry) {
            None => true,
            Some(previous) => {
                if previous.type_id != entry.type_id {
                    warn!(
                        id = %R::ID,
                        previous = previous.name,
                        current = R::NAME,
                        "Report id rebound to a different type"
                    );
                }
                false
            }
        }
    }

    pub fn contains(&self, id: ReportId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn name_of(&self, id: ReportId) -> Option<&'static str> {
        self.entries.get(&id).map(|entry| entry.name)
    }

    /// Known report ids in ascending order.
    pub fn known_ids(&self) -> Vec<ReportId> {
        let mut ids: Vec<ReportId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a frame into whichever report type its id is bound to.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyFrame`, `Error::UnknownReportId`, or the decode
    /// error of the resolved type.
    pub fn decode(&self, frame: &[u8]) -> Result<DecodedReport> {
        let id = leading_id(frame)?;
        let entry = self.entries.get(&id).ok_or(Error::UnknownReportId(id))?;
        let value = (entry.decode)(frame)?;

        Ok(DecodedReport {
            id,
            name: entry.name,
            type_id: entry.type_id,
            value,
        })
    }
}

impl fmt::Debug for ReportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.known_ids()
                    .into_iter()
                    .filter_map(|id| self.name_of(id).map(|name| (id, name))),
            )
            .finish()
    }
}

/// A report decoded without knowing its type up front.
pub struct DecodedReport {
    pub id: ReportId,
    pub name: &'static str,
    type_id: TypeId,
    value: Box<dyn Any + Send>,
}

impl DecodedReport {
    pub fn report_type(&self) -> TypeId {
        self.type_id
    }

    pub fn is<R: Report>(&self) -> bool {
        self.type_id == TypeId::of::<R>()
    }

    pub fn downcast_ref<R: Report>(&self) -> Option<&R> {
        self.value.downcast_ref::<R>()
    }

    pub fn into_report<R: Report>(self) -> Option<R> {
        self.value.downcast::<R>().ok().map(|boxed| *boxed)
    }

    pub fn as_any(&self) -> &dyn Any {
        &*self.value
    }
}

impl fmt::Debug for DecodedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedReport")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
