use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use bmc_core::{BmcError, ChainLogger, ErrorInfo, Score, SimulationState};

/// Tab-separated trace of sampled parameter values.
///
/// Columns are `state`, `posterior`, `prior`, `likelihood`, then one column
/// per parameter component (`name` for scalars, `name.i` otherwise) and one
/// per tree height (`tree.height`). The header is taken from the first
/// logged state.
#[derive(Debug)]
pub struct TraceLogger {
    path: PathBuf,
    resume_at: Option<u64>,
    writer: Option<BufWriter<File>>,
    header_written: bool,
}

impl TraceLogger {
    /// Creates a logger that truncates `path` when logging starts.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resume_at: None,
            writer: None,
            header_written: false,
        }
    }

    /// Continues an existing trace from `step` instead of truncating it.
    ///
    /// Rows at or after `step` were written by the interrupted run after its
    /// checkpoint; they are dropped so the resumed chain does not repeat them.
    pub fn resuming_at(mut self, step: Option<u64>) -> Self {
        self.resume_at = step;
        self
    }

    /// Destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, code: &str, err: std::io::Error) -> BmcError {
        BmcError::Serde(
            ErrorInfo::new(code, err.to_string())
                .with_context("path", self.path.display().to_string()),
        )
    }

    fn drop_rows_from(&self, step: u64) -> Result<(), BmcError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(self.io_error("trace-read", err)),
        };
        let mut kept = String::with_capacity(contents.len());
        for line in contents.lines() {
            let row_step = line.split('\t').next().and_then(|field| field.parse::<u64>().ok());
            if row_step.map_or(true, |row| row < step) {
                kept.push_str(line);
                kept.push('\n');
            }
        }
        if kept.len() != contents.len() {
            fs::write(&self.path, kept).map_err(|err| self.io_error("trace-write", err))?;
        }
        Ok(())
    }

    fn header(state: &SimulationState) -> String {
        let mut columns = vec![
            "state".to_string(),
            "posterior".to_string(),
            "prior".to_string(),
            "likelihood".to_string(),
        ];
        for parameter in state.parameters() {
            if parameter.dimension() == 1 {
                columns.push(parameter.name().to_string());
            } else {
                columns.extend(
                    (0..parameter.dimension()).map(|i| format!("{}.{}", parameter.name(), i + 1)),
                );
            }
        }
        for tree in state.trees() {
            columns.push(format!("{}.height", tree.name()));
        }
        columns.join("\t")
    }
}

impl ChainLogger for TraceLogger {
    fn start_logging(&mut self) -> Result<(), BmcError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.io_error("trace-mkdir", err))?;
        }
        if let Some(step) = self.resume_at {
            self.drop_rows_from(step)?;
        }
        let append = self.resume_at.is_some();
        let file = if append {
            OpenOptions::new().create(true).append(true).open(&self.path)
        } else {
            File::create(&self.path)
        }
        .map_err(|err| self.io_error("trace-open", err))?;
        let existing = file
            .metadata()
            .map_err(|err| self.io_error("trace-open", err))?
            .len();
        self.header_written = append && existing > 0;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn log(&mut self, step: u64, state: &SimulationState, score: &Score) -> Result<(), BmcError> {
        let header = (!self.header_written).then(|| Self::header(state));
        let mut line = format!(
            "{step}\t{}\t{}\t{}",
            score.log_posterior, score.log_prior, score.log_likelihood
        );
        for parameter in state.parameters() {
            for value in parameter.values() {
                line.push('\t');
                line.push_str(&value.to_string());
            }
        }
        for tree in state.trees() {
            line.push('\t');
            line.push_str(&tree.height(tree.root())?.to_string());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(BmcError::Serde(
                ErrorInfo::new("trace-closed", "log called before start_logging")
                    .with_context("path", self.path.display().to_string()),
            ));
        };
        let result = match header {
            Some(header) => writeln!(writer, "{header}").and_then(|_| writeln!(writer, "{line}")),
            None => writeln!(writer, "{line}"),
        };
        result.map_err(|err| self.io_error("trace-write", err))?;
        self.header_written = true;
        Ok(())
    }

    fn stop_logging(&mut self) -> Result<(), BmcError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|err| self.io_error("trace-write", err))?;
        }
        Ok(())
    }
}
