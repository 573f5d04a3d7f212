use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Run environment handed to the model on stdin.
///
/// `input` carries the model parameters next to the reserved `seed` and
/// `replicate` keys; `output` names either one sink or a set of profiles.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "I: DeserializeOwned"))]
pub struct Environment<I> {
    pub input: RunInput<I>,
    #[serde(default)]
    output: Option<OutputSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "I: DeserializeOwned"))]
pub struct RunInput<I> {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub replicate: u64,
    #[serde(flatten)]
    pub parameters: I,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutputSpec {
    Profiled { profile: BTreeMap<String, Sink> },
    Single(Sink),
}

#[derive(Debug, Deserialize)]
struct Sink {
    spec: String,
    #[serde(default)]
    dir: Option<PathBuf>,
}

impl Sink {
    fn filesystem_dir(&self) -> Option<&Path> {
        (self.spec == "filesystem").then_some(self.dir.as_deref()).flatten()
    }
}

impl<I: DeserializeOwned> Environment<I> {
    pub fn from_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            bail!("no run environment given");
        }
        serde_json::from_str(raw).context("failed to parse run environment")
    }

    pub fn from_stdin() -> Result<Self> {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read stdin")?;
        Self::from_json(&raw)
    }
}

impl<I> Environment<I> {
    pub fn parameters(&self) -> &I {
        &self.input.parameters
    }

    /// Filesystem directory of the flat output, or of the `default` profile
    /// (first profile otherwise).
    pub fn output_dir(&self) -> Option<&Path> {
        match self.output.as_ref()? {
            OutputSpec::Single(sink) => sink.filesystem_dir(),
            OutputSpec::Profiled { profile } => profile
                .get("default")
                .or_else(|| profile.values().next())?
                .filesystem_dir(),
        }
    }

    /// Writes `rows` as CSV to the output directory, or to stdout when no
    /// directory is configured.
    pub fn write_csv(&self, filename: &str, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
        let Some(dir) = self.output_dir() else {
            return write_rows(io::stdout().lock(), headers, rows);
        };
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(filename);
        let file =
            fs::File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = rows.len(), "writing output");
        write_rows(file, headers, rows)
    }
}

fn write_rows<W: Write>(writer: W, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
