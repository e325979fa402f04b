use crate::{base::QueryTemplate, DriverInfo, SqlType};
use debug_ignore::DebugIgnore;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

// Stable request identities; never reused within a process.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// How many rows a request is allowed to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowMult {
    Zero,
    One,
    ZeroOrOne,
    ZeroOrMore,
}

impl RowMult {
    pub(crate) fn can_be_many(self) -> bool {
        matches!(self, RowMult::ZeroOrMore)
    }

    pub(crate) fn expects_tuples(self) -> bool {
        !matches!(self, RowMult::Zero)
    }
}

/// A database request: parameter and row descriptors, a row multiplicity
/// contract, and a function producing the query template for a driver.
///
/// A request constructed with [`RequestSpec::prepared`] carries a stable
/// identity and is prepared once per connection, then reused; a
/// [`RequestSpec::oneshot`] request is sent directly with inline parameters.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    id: Option<u64>,
    param_type: SqlType,
    row_type: SqlType,
    row_mult: RowMult,
    query: DebugIgnore<Arc<dyn Fn(&DriverInfo) -> QueryTemplate + Send + Sync>>,
}

impl RequestSpec {
    /// A request with a stable identity, prepared on first use per connection.
    ///
    /// `?` marks in `sql` outside of quoted literals become positional
    /// parameters, in order.
    pub fn prepared(param_type: SqlType, row_type: SqlType, row_mult: RowMult, sql: &str) -> Self {
        let template = QueryTemplate::with_question_marks(sql);
        Self::prepared_with(param_type, row_type, row_mult, move |_| template.clone())
    }

    /// Like [`RequestSpec::prepared`], with a driver-dependent template.
    pub fn prepared_with(
        param_type: SqlType,
        row_type: SqlType,
        row_mult: RowMult,
        query: impl Fn(&DriverInfo) -> QueryTemplate + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: Some(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)),
            param_type,
            row_type,
            row_mult,
            query: DebugIgnore(Arc::new(query)),
        }
    }

    /// A request without identity; sent without statement preparation.
    pub fn oneshot(param_type: SqlType, row_type: SqlType, row_mult: RowMult, sql: &str) -> Self {
        let template = QueryTemplate::with_question_marks(sql);
        Self::oneshot_with(param_type, row_type, row_mult, move |_| template.clone())
    }

    /// Like [`RequestSpec::oneshot`], with a driver-dependent template.
    pub fn oneshot_with(
        param_type: SqlType,
        row_type: SqlType,
        row_mult: RowMult,
        query: impl Fn(&DriverInfo) -> QueryTemplate + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: None,
            param_type,
            row_type,
            row_mult,
            query: DebugIgnore(Arc::new(query)),
        }
    }

    /// The stable identity, or `None` for one-shot requests.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    #[must_use]
    pub fn param_type(&self) -> &SqlType {
        &self.param_type
    }

    #[must_use]
    pub fn row_type(&self) -> &SqlType {
        &self.row_type
    }

    #[must_use]
    pub fn row_mult(&self) -> RowMult {
        self.row_mult
    }

    /// Produces the query template for the given driver.
    #[must_use]
    pub fn query_template(&self, driver_info: &DriverInfo) -> QueryTemplate {
        (self.query.0)(driver_info)
    }
}
