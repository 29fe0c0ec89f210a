//! TOML configuration for the grading commands.
//!
//! Every table is optional; a missing file section falls back to the
//! legacy essay rubric and grade sheet layout.
//!
//! ```toml
//! [rubric]
//! heading = "Grading for {name} EGR260 essay two:"
//!
//! [[rubric.lines]]
//! kind = "score"
//! label = "Thesis"
//! out_of = 5.0
//!
//! [[rubric.lines]]
//! kind = "total"
//! label = "Total"
//!
//! [sheet]
//! target_column = { contains = "Essay #2" }
//!
//! [distribution]
//! flag = "=6.5"
//!
//! [print]
//! command = "lpr"
//! args = ["-o", "sides=two-sided-long-edge"]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GradeError, InFile, Result};
use crate::print::{CommandPrinter, NoopPrinter, PrintDispatch};
use crate::rubric::{Rubric, RubricConfig};
use crate::sheet::SheetConfig;
use crate::stats::FlagRule;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    pub rubric: RubricConfig,
    pub sheet: SheetConfig,
    pub distribution: DistributionConfig,
    pub print: PrintConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub flag: Option<FlagRule>,
    pub bins: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            flag: None,
            bins: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "lpr".to_string(),
            args: Vec::new(),
        }
    }
}

impl PrintConfig {
    pub fn printer(&self) -> Box<dyn PrintDispatch> {
        if self.enabled {
            Box::new(CommandPrinter::new(&self.command, self.args.clone()))
        } else {
            Box::new(NoopPrinter)
        }
    }
}

impl GraderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).in_file(path)?;
        let config = Self::from_toml(&text).in_file(path)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| GradeError::Config(e.to_string()))
    }

    /// The validated rubric.
    pub fn rubric(&self) -> Result<Rubric> {
        Rubric::new(self.rubric.clone())
    }
}
