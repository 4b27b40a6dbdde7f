// src/config.rs

use derive_builder::Builder;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating a [`PipelineConfig`].
///
/// All of these are fatal before the pipeline starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker count must be greater than 0")]
    InvalidWorkerCount,

    #[error("worker count {requested} exceeds CPU count {max}")]
    TooManyWorkers { requested: usize, max: usize },

    #[error("{channel} channel size must be greater than 0")]
    InvalidChannelSize { channel: &'static str },

    #[error("lines per file must be greater than 0")]
    InvalidLinesPerFile,

    #[error("input file name cannot be empty")]
    EmptyInputFileName,

    #[error("output file name cannot be empty")]
    EmptyOutputFileName,

    #[error("output file name {template:?} must contain exactly one %d placeholder, found {found}")]
    InvalidTemplate { template: String, found: usize },

    #[error("failed to read configuration {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode configuration {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings for one extraction run.
///
/// Deserializes from the camelCase JSON layout of `app_configuration.json`:
///
/// ```json
/// {
///   "inputFileName": "input.jsonl",
///   "outputFileName": "output-%d.csv",
///   "numWorkers": 4,
///   "linesPerFile": 1000,
///   "linesChannelSize": 100,
///   "resultsChannelSize": 100
/// }
/// ```
#[derive(Debug, Clone, Builder, Deserialize)]
#[builder(setter(into))]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Newline-delimited JSON input file
    pub(crate) input_file_name: PathBuf,

    /// Shard path template with a single `%d` placeholder
    pub(crate) output_file_name: String,

    /// Number of concurrent parsing workers
    #[builder(default = "1")]
    pub(crate) num_workers: usize,

    /// Maximum number of rows written to one shard
    #[builder(default = "1000")]
    pub(crate) lines_per_file: usize,

    /// Capacity of the queue between the line reader and the workers
    #[builder(default = "100")]
    pub(crate) lines_channel_size: usize,

    /// Capacity of the queue between the workers and the shard writer
    #[builder(default = "100")]
    pub(crate) results_channel_size: usize,
}

impl PipelineConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[inline]
    pub fn input_file_name(&self) -> &Path {
        &self.input_file_name
    }

    #[inline]
    pub fn output_file_name(&self) -> &str {
        &self.output_file_name
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    #[inline]
    pub fn lines_per_file(&self) -> usize {
        self.lines_per_file
    }

    #[inline]
    pub fn lines_channel_size(&self) -> usize {
        self.lines_channel_size
    }

    #[inline]
    pub fn results_channel_size(&self) -> usize {
        self.results_channel_size
    }

    /// Full validation, capping the worker count at the available CPUs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with_parallelism(num_cpus::get())
    }

    /// Full validation against an explicit worker ceiling.
    pub fn validate_with_parallelism(&self, max_workers: usize) -> Result<(), ConfigError> {
        self.check()?;
        if self.num_workers > max_workers {
            return Err(ConfigError::TooManyWorkers {
                requested: self.num_workers,
                max: max_workers,
            });
        }
        Ok(())
    }

    /// Checks the values the pipeline cannot run without.
    ///
    /// Unlike [`validate`](Self::validate) this does not bound the worker
    /// count by the host's parallelism.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        if self.lines_channel_size == 0 {
            return Err(ConfigError::InvalidChannelSize { channel: "lines" });
        }
        if self.results_channel_size == 0 {
            return Err(ConfigError::InvalidChannelSize { channel: "results" });
        }
        if self.lines_per_file == 0 {
            return Err(ConfigError::InvalidLinesPerFile);
        }
        if self.input_file_name.as_os_str().is_empty() {
            return Err(ConfigError::EmptyInputFileName);
        }
        if self.output_file_name.is_empty() {
            return Err(ConfigError::EmptyOutputFileName);
        }
        self.output_template().map(|_| ())
    }

    pub fn output_template(&self) -> Result<OutputTemplate, ConfigError> {
        OutputTemplate::parse(&self.output_file_name)
    }
}

/// Shard file naming: a path with exactly one `%d`, replaced by the shard index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    prefix: String,
    suffix: String,
}

impl OutputTemplate {
    /// Splits `template` around its single `%d`. A `%%` stands for a
    /// literal `%` and never starts a placeholder.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '%' {
                match chars.peek() {
                    Some('%') => {
                        chars.next();
                        current.push('%');
                        continue;
                    }
                    Some('d') => {
                        chars.next();
                        segments.push(std::mem::take(&mut current));
                        continue;
                    }
                    _ => {}
                }
            }
            current.push(c);
        }
        segments.push(current);

        let found = segments.len() - 1;
        match <[String; 2]>::try_from(segments) {
            Ok([prefix, suffix]) => Ok(Self { prefix, suffix }),
            Err(_) => Err(ConfigError::InvalidTemplate {
                template: template.to_owned(),
                found,
            }),
        }
    }

    /// Path of the shard with the given index.
    pub fn path(&self, index: usize) -> PathBuf {
        PathBuf::from(format!("{}{}{}", self.prefix, index, self.suffix))
    }
}
