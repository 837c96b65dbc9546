use super::{build_coordinator, ConnectionArgs};
use crate::errors::{AppError, AppResult};
use crate::types::{BlockchainQuery, Source};
use clap::Args;
use futures::stream::StreamExt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Resolve many queries concurrently, one `<kind> <key>` per line
#[derive(Args)]
pub struct BatchCommand {
    /// File containing queries (one per line), or stdin if omitted
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Concurrent resolve limit
    #[arg(long, default_value = "4")]
    pub parallel: usize,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Tally of batch outcomes by source
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub cache: usize,
    pub upstream: usize,
    pub fallback: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, source: Option<Source>) {
        match source {
            Some(Source::Cache) => self.cache += 1,
            Some(Source::Upstream) => self.upstream += 1,
            Some(Source::Fallback) => self.fallback += 1,
            None => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.cache + self.upstream + self.fallback + self.failed
    }
}

/// Non-empty, non-comment lines of a batch input
pub fn read_query_lines<R: BufRead>(reader: R) -> Vec<String> {
    reader
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

impl BatchCommand {
    pub async fn run(&self) -> AppResult<()> {
        let lines = match &self.file {
            Some(path) => {
                let file = fs::File::open(path)
                    .map_err(|e| AppError::Config(format!("Failed to open file: {}", e)))?;
                read_query_lines(BufReader::new(file))
            }
            None => read_query_lines(BufReader::new(std::io::stdin())),
        };

        if lines.is_empty() {
            return Err(AppError::Config("No queries provided".to_string()));
        }

        let config = self.connection.load_config();
        let coordinator = build_coordinator(&config)?;
        let parallel = self.parallel.max(1);

        info!(
            "Batch resolving {} queries (parallel: {})",
            lines.len(),
            parallel
        );

        let outcomes: Vec<(String, AppResult<crate::types::Resolved>)> =
            futures::stream::iter(lines)
                .map(|line| {
                    let coordinator = coordinator.clone();
                    async move {
                        let result = match BlockchainQuery::parse_line(&line) {
                            Ok(query) => {
                                debug!("Resolving {}", query);
                                coordinator.resolve(&query).await.map_err(AppError::from)
                            }
                            Err(e) => Err(AppError::from(e)),
                        };
                        (line, result)
                    }
                })
                .buffer_unordered(parallel)
                .collect()
                .await;

        let mut summary = BatchSummary::default();
        for (line, outcome) in outcomes {
            match outcome {
                Ok(resolved) => {
                    summary.record(Some(resolved.source));
                    println!("{}", serde_json::to_string(&resolved)?);
                }
                Err(e) => {
                    summary.record(None);
                    error!("Failed to resolve '{}': {}", line, e);
                    eprintln!("  {} FAILED: {}", line, e);
                }
            }
        }

        eprintln!(
            "Resolved {}/{} (cache: {}, upstream: {}, fallback: {}, failed: {})",
            summary.total() - summary.failed,
            summary.total(),
            summary.cache,
            summary.upstream,
            summary.fallback,
            summary.failed
        );
        Ok(())
    }
}
