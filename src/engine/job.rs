//! Job runner
//!
//! Runs the stages of a [`JobConfig`] in order, one slice at a time, and
//! writes each stage's records as JSON lines. `each` stages walk the records
//! of an earlier stage of the same run.

use super::types::{JobReport, Source, StageReport};
use super::{collect_each, Harvester, WindowCollector};
use crate::checkpoint::{CheckpointStore, WindowProgress};
use crate::config::{JobConfig, StageConfig, StageKind};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::pagination::Query;
use crate::template::{self, TemplateContext};
use crate::types::{ItemKind, JsonValue, RecordStream};
use crate::window::TimeSlice;
use futures::{future, stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs a harvest job
#[derive(Debug)]
pub struct JobRunner {
    config: JobConfig,
    harvester: Harvester,
    store: CheckpointStore,
    output_dir: PathBuf,
}

impl JobRunner {
    /// Create a runner for a job, using the given client for every request
    pub fn new(config: JobConfig, client: HttpClient) -> Result<Self> {
        let store = config.checkpoint_store()?;
        let output_dir = config.output_dir.clone();
        Ok(Self {
            config,
            harvester: Harvester::new(client),
            store,
            output_dir,
        })
    }

    /// Write output files somewhere else than the configured directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// The job's checkpoint store
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// The harvester running the stages
    pub fn harvester(&self) -> &Harvester {
        &self.harvester
    }

    /// Run every stage
    ///
    /// A failing optional stage is skipped when the failure is a fetch
    /// failure or a rejected request; any other failure ends the job with
    /// its checkpoints in place. An `each` stage whose source stage was
    /// skipped is skipped too. Checkpoints are cleared only when every
    /// stage completed.
    pub async fn run(&self) -> Result<JobReport> {
        let start = Instant::now();
        let window = self.config.time_window()?;
        let slices = window.slices(self.config.window.slice_months)?;
        info!(
            "Harvesting {}/{} from {} to {} in {} slices",
            self.config.owner,
            self.config.repo,
            window.start,
            window.end,
            slices.len()
        );

        let mut report = JobReport::default();
        let mut collected: HashMap<&str, Vec<JsonValue>> = HashMap::new();
        for stage in &self.config.stages {
            info!("Stage '{}' starting", stage.name);
            let outcome = match stage.kind {
                StageKind::Each => {
                    let from = stage.source_stage()?;
                    let Some(parents) = collected.get(from) else {
                        let reason = format!("source stage '{from}' was skipped");
                        warn!("Skipping stage '{}': {reason}", stage.name);
                        report.stages.push(StageReport::skipped(&stage.name, reason));
                        continue;
                    };
                    self.run_each(stage, parents)
                        .await
                        .map(|records| (records, Vec::new()))
                }
                StageKind::Resource | StageKind::Search => self
                    .run_stage(stage, &slices)
                    .await
                    .map(|progress| (progress.records, progress.overflows)),
            };

            match outcome {
                Ok((records, overflows)) => {
                    let output = self.write_output(&stage.name, &records).await?;
                    info!(
                        "Stage '{}' done: {} records in {}",
                        stage.name,
                        records.len(),
                        output.display()
                    );
                    report
                        .stages
                        .push(StageReport::completed(&stage.name, records.len(), output));
                    report.overflows.extend(overflows);
                    collected.insert(stage.name.as_str(), records);
                }
                Err(e) if stage.optional && e.is_fetch_error() => {
                    warn!("Skipping optional stage '{}': {e}", stage.name);
                    report.stages.push(StageReport::skipped(&stage.name, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        if report.is_complete() {
            report.checkpoints_cleared = self.store.clear_all().await?;
        } else {
            info!(
                "Keeping checkpoints, skipped stages: {}",
                report.skipped().join(", ")
            );
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        Ok(report)
    }

    /// Collect the records of a resource or search stage
    ///
    /// The returned progress carries the stage's records and the search
    /// overflows of every slice, including slices collected by earlier runs.
    pub async fn run_stage(&self, stage: &StageConfig, slices: &[TimeSlice]) -> Result<WindowProgress> {
        let source = self.source(stage)?;
        let harvester = &self.harvester;
        let kind = stage.item_kind;

        WindowCollector::new(&self.store, &stage.name)
            .with_scope(self.scope(stage, &source))
            .tracking_overflows(harvester)
            .collect(slices, |slice| {
                filter_items(harvester.fetch_slice(&source, slice), kind)
            })
            .await
    }

    /// Fetch the children of every parent record of an `each` stage
    ///
    /// `item_kind` selects the parents; records lacking a path variable are
    /// passed over.
    pub async fn run_each(&self, stage: &StageConfig, parents: &[JsonValue]) -> Result<Vec<JsonValue>> {
        let path = stage.resource_path()?;
        let kind = stage.item_kind;
        let items: Vec<JsonValue> = parents.iter().filter(|p| kind.matches(p)).cloned().collect();
        let scope = format!(
            "{} from {} ({} items)",
            path,
            stage.source_stage()?,
            items.len()
        );
        info!("Stage '{}' walks {} records", stage.name, items.len());

        let ctx = self.config.template_context();
        let harvester = &self.harvester;
        collect_each(
            &self.store,
            &stage.name,
            &scope,
            &items,
            stage.checkpoint_every,
            |item: &JsonValue| -> RecordStream {
                match template::render(path, &ctx.clone().with_record(item)) {
                    Ok(rendered) => annotate(
                        harvester.fetch_path(rendered, stage.single),
                        item,
                        stage.parent_key.as_deref(),
                    ),
                    Err(e) => {
                        debug!("Passing over a record of '{}': {e}", stage.name);
                        stream::empty().boxed()
                    }
                }
            },
        )
        .await
    }

    /// Checkpoint scope of a windowed stage
    fn scope(&self, stage: &StageConfig, source: &Source) -> String {
        format!(
            "{}/{} {} item_kind={:?}",
            self.config.owner,
            self.config.repo,
            source.describe(),
            stage.item_kind
        )
    }

    /// Build the record source of a stage
    fn source(&self, stage: &StageConfig) -> Result<Source> {
        let ctx = self.config.template_context();
        match stage.kind {
            StageKind::Resource => {
                let path = template::render(stage.resource_path()?, &ctx)?;
                let mut query = Query::resource(path);
                for (key, value) in &stage.params {
                    query = query.with_param(key, render_param(value, &ctx)?);
                }
                Ok(Source::Resource(query))
            }
            StageKind::Search => Ok(Source::Search(
                stage.search_template()?.with_context(ctx),
            )),
            StageKind::Each => Err(Error::invalid_value(
                format!("stages.{}.kind", stage.name),
                "each stages have no time window source",
            )),
        }
    }

    /// Write records as JSON lines to `<output_dir>/<stage>.jsonl`
    async fn write_output(&self, stage: &str, records: &[JsonValue]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_path(stage);
        let mut contents = String::new();
        for record in records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Output file of a stage
    pub fn output_path(&self, stage: &str) -> PathBuf {
        self.output_dir.join(format!("{stage}.jsonl"))
    }
}

fn render_param(value: &str, ctx: &TemplateContext) -> Result<String> {
    if template::has_templates(value) {
        template::render(value, ctx)
    } else {
        Ok(value.to_string())
    }
}

fn filter_items(records: RecordStream, kind: ItemKind) -> RecordStream {
    if kind == ItemKind::Any {
        return records;
    }
    Box::pin(records.try_filter(move |item| future::ready(kind.matches(item))))
}

/// Copy the parent's `key` field into every child object as `parent_<key>`
fn annotate(records: RecordStream, parent: &JsonValue, key: Option<&str>) -> RecordStream {
    let Some((field, value)) = key.and_then(|key| {
        parent
            .get(key)
            .map(|value| (format!("parent_{key}"), value.clone()))
    }) else {
        return records;
    };
    records
        .map_ok(move |mut child| {
            if let Some(object) = child.as_object_mut() {
                object.insert(field.clone(), value.clone());
            }
            child
        })
        .boxed()
}
