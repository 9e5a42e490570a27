//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, ItemFilter, WindowArgs};
use crate::config::{load_job, JobConfig};
use crate::engine::{Harvester, JobRunner};
use crate::error::{Result, ResultExt};
use crate::http::{HttpClient, HttpClientConfig};
use crate::pagination::SearchTemplate;
use crate::types::{ItemKind, RecordStream};
use crate::window::TimeWindow;
use futures::{future, TryStreamExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Slices { window } => self.slices(window),
            Commands::Count { query } => self.count(query).await,
            Commands::Resource {
                owner,
                repo,
                resource,
                window,
                output,
            } => {
                self.resource(owner, repo, resource, window, output.as_deref())
                    .await
            }
            Commands::Search {
                query,
                window,
                item_kind,
                output,
            } => self.search(query, window, *item_kind, output.as_deref()).await,
            Commands::Run { job, output_dir } => self.run_job(job, output_dir.clone()).await,
            Commands::Clear { job } => self.clear(job).await,
        }
    }

    fn slices(&self, args: &WindowArgs) -> Result<()> {
        let window = TimeWindow::parse(&args.since, &args.until)?;
        for slice in window.slices(args.months)? {
            println!("{}", slice.id());
        }
        Ok(())
    }

    async fn count(&self, query: &str) -> Result<()> {
        let harvester = Harvester::new(self.client()?);
        println!("{}", harvester.count(query).await?);
        Ok(())
    }

    async fn resource(
        &self,
        owner: &str,
        repo: &str,
        resource: &str,
        args: &WindowArgs,
        output: Option<&Path>,
    ) -> Result<()> {
        let window = TimeWindow::parse(&args.since, &args.until)?;
        let harvester = Harvester::new(self.client()?);
        let records = harvester.fetch_resource_window(owner, repo, resource, &window, args.months);
        let written = write_records(records, output).await?;
        info!("Collected {written} {resource} records of {owner}/{repo}");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        args: &WindowArgs,
        filter: ItemFilter,
        output: Option<&Path>,
    ) -> Result<()> {
        let window = TimeWindow::parse(&args.since, &args.until)?;
        let template = SearchTemplate::new(query)?;
        let harvester = Harvester::new(self.client()?);

        let kind = ItemKind::from(filter);
        let records: RecordStream = Box::pin(
            harvester
                .fetch_search_window(&template, &window, args.months)
                .try_filter(move |item| future::ready(kind.matches(item))),
        );
        let written = write_records(records, output).await?;
        info!("Collected {written} search matches");

        for overflow in harvester.overflows() {
            warn!("Search overflow on {overflow}");
        }
        Ok(())
    }

    async fn run_job(&self, path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
        let config = load_job(path)?;
        let client = HttpClient::with_config(self.job_client_config(&config))?;

        let mut runner = JobRunner::new(config, client)?;
        if let Some(dir) = output_dir {
            runner = runner.with_output_dir(dir);
        }

        let report = runner.run().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    async fn clear(&self, path: &Path) -> Result<()> {
        let config = load_job(path)?;
        let removed = config.checkpoint_store()?.clear_all().await?;
        println!("Removed {removed} checkpoint files");
        Ok(())
    }

    /// Client for ad-hoc commands
    fn client(&self) -> Result<HttpClient> {
        let mut builder = HttpClientConfig::builder();
        if let Some(url) = &self.cli.base_url {
            builder = builder.base_url(url);
        }
        if let Some(token) = &self.cli.token {
            builder = builder.token(token);
        }
        HttpClient::with_config(builder.build())
    }

    /// Client settings of a job, with CLI overrides applied
    fn job_client_config(&self, config: &JobConfig) -> HttpClientConfig {
        let token = self
            .cli
            .token
            .clone()
            .or_else(|| std::env::var(&config.api.token_env).ok());
        if token.is_none() {
            debug!("No token in --token or ${}", config.api.token_env);
        }

        let mut http = config.client_config(token);
        if let Some(url) = &self.cli.base_url {
            http.base_url = Some(url.clone());
        }
        http
    }
}

/// Write records as JSON lines to a file or stdout, returning the count
async fn write_records(mut records: RecordStream, output: Option<&Path>) -> Result<usize> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut count = 0;
    while let Some(record) = records.try_next().await? {
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}
