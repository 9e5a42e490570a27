//! Date range bisection for capped search queries
//!
//! A search query matching more than the cap is re-issued over halves of its
//! date range until every piece fits. Pieces are processed from an explicit
//! worklist so results stay in chronological order.

use super::strategies::CappedSearchPaginator;
use super::types::{Overflow, Query};
use crate::error::{Error, Result};
use crate::template::{extract_variables, render, TemplateContext};
use crate::types::RecordStream;
use crate::window::DateRange;
use chrono::NaiveDate;
use futures::{stream, StreamExt, TryStreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// A search query with `{{ from }}` and `{{ to }}` date placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTemplate {
    template: String,
    context: TemplateContext,
}

impl SearchTemplate {
    /// Parse a template, which must mention both `from` and `to`
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let vars = extract_variables(&template);
        for required in ["from", "to"] {
            if !vars.iter().any(|v| v == required) {
                return Err(Error::template(format!(
                    "search query must contain {{{{ {required} }}}}: {template}"
                )));
            }
        }
        Ok(Self {
            template,
            context: TemplateContext::new(),
        })
    }

    /// Bind the remaining variables, such as `owner` and `repo`
    #[must_use]
    pub fn with_context(mut self, context: TemplateContext) -> Self {
        self.context = context;
        self
    }

    /// The raw template
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Render the query for an inclusive date range
    pub fn render(&self, range: &DateRange) -> Result<String> {
        let ctx = self
            .context
            .clone()
            .with("from", range.from_date())
            .with("to", range.to_date());
        render(&self.template, &ctx)
    }
}

/// Exhaustive search over a date range by bisection
///
/// Clones share the overflow log.
#[derive(Debug, Clone)]
pub struct RangeSplitter {
    search: CappedSearchPaginator,
    overflows: Arc<Mutex<Vec<Overflow>>>,
}

impl RangeSplitter {
    /// Create a splitter on top of a search paginator
    pub fn new(search: CappedSearchPaginator) -> Self {
        Self {
            search,
            overflows: Arc::default(),
        }
    }

    /// Every single-day overflow recorded so far
    pub fn overflows(&self) -> Vec<Overflow> {
        self.overflows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stream every match of the template between `from` and `to` inclusive
    ///
    /// Each range is counted first. Ranges within the cap are paginated;
    /// larger ones are split at `from + (to - from) / 2` and the left half is
    /// processed first. A single day over the cap cannot be split: it is
    /// paginated up to the cap and recorded as an [`Overflow`].
    pub fn fetch_range(
        &self,
        template: &SearchTemplate,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RecordStream {
        let pending = if from <= to {
            vec![DateRange::new(from, to)]
        } else {
            Vec::new()
        };
        let this = self.clone();
        let template = template.clone();

        let pieces = stream::try_unfold(pending, move |mut pending| {
            let this = this.clone();
            let template = template.clone();
            async move {
                let Some(range) = pending.pop() else {
                    return Ok::<_, Error>(None);
                };
                let piece = this.process(&template, range, &mut pending).await?;
                Ok(Some((piece, pending)))
            }
        });

        Box::pin(pieces.try_flatten())
    }

    /// Count one range and either split it or return its records
    async fn process(
        &self,
        template: &SearchTemplate,
        range: DateRange,
        pending: &mut Vec<DateRange>,
    ) -> Result<RecordStream> {
        let query = Query::search(template.render(&range)?);
        let total = self.search.count(&query).await?;
        let cap = self.search.limits().cap();

        if total == 0 {
            debug!("No matches for {range}");
            return Ok(stream::empty().boxed());
        }
        if total <= cap {
            debug!("{total} matches for {range}, fetching");
            return Ok(self.search.fetch_all(&query));
        }

        match range.split() {
            Some((left, right)) => {
                debug!("{total} matches for {range} exceed {cap}, splitting into {left} and {right}");
                pending.push(right);
                pending.push(left);
                Ok(stream::empty().boxed())
            }
            None => {
                warn!(
                    "{total} matches on {} exceed the search cap of {cap}, {} cannot be retrieved",
                    range.from,
                    total - cap
                );
                self.overflows
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(Overflow {
                        query: query.describe(),
                        day: range.from,
                        total_count: total,
                        retrievable: cap,
                    });
                Ok(self.search.fetch_all(&query))
            }
        }
    }
}
