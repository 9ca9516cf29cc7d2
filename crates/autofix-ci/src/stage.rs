//! Toolchain stage definitions and configuration.

use std::path::Path;

use autofix_core::{AutofixError, Result};
use serde::{Deserialize, Serialize};

/// Default timeout for the build stage.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 300;

/// Default timeout for the run stage.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 60;

/// Which half of validation a stage belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Compile the candidate.
    Build,

    /// Execute the compiled candidate.
    Run,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Build => "build",
            StageKind::Run => "run",
        }
    }
}

/// Builtin toolchains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinToolchain {
    /// javac {file} / java {stem}
    Java,

    /// rustc {file} -o {stem} / ./{stem}
    Rust,

    /// python3 -m py_compile {file} / python3 {file}
    Python,
}

impl BuiltinToolchain {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinToolchain::Java => "java",
            BuiltinToolchain::Rust => "rust",
            BuiltinToolchain::Python => "python",
        }
    }

    /// Parse a toolchain name as given on the command line.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "java" => Ok(BuiltinToolchain::Java),
            "rust" => Ok(BuiltinToolchain::Rust),
            "python" | "python3" => Ok(BuiltinToolchain::Python),
            other => Err(AutofixError::InvalidConfig(format!(
                "unknown toolchain: {other}"
            ))),
        }
    }

    /// Command template for a stage. Placeholders are resolved per file.
    pub fn command(&self, kind: StageKind) -> Vec<String> {
        let parts: &[&str] = match (self, kind) {
            (BuiltinToolchain::Java, StageKind::Build) => &["javac", "{file}"],
            (BuiltinToolchain::Java, StageKind::Run) => &["java", "{stem}"],
            (BuiltinToolchain::Rust, StageKind::Build) => &["rustc", "{file}", "-o", "{stem}"],
            (BuiltinToolchain::Rust, StageKind::Run) => &["./{stem}"],
            (BuiltinToolchain::Python, StageKind::Build) => {
                &["python3", "-m", "py_compile", "{file}"]
            }
            (BuiltinToolchain::Python, StageKind::Run) => &["python3", "{file}"],
        };
        parts.iter().map(|s| s.to_string()).collect()
    }
}

/// Configuration for one toolchain stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    /// Command to execute (first element is executable). May contain
    /// `{file}`, `{stem}` and `{dir}` placeholders.
    pub command: Vec<String>,

    /// Timeout in seconds (0 = no timeout).
    pub timeout_secs: u64,
}

impl StageConfig {
    /// Create a stage configuration from a builtin toolchain.
    pub fn from_builtin(toolchain: BuiltinToolchain, kind: StageKind, timeout_secs: u64) -> Self {
        Self {
            name: kind.name().to_string(),
            command: toolchain.command(kind),
            timeout_secs,
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            timeout_secs,
        }
    }

    /// Parse a whitespace-separated command line. No shell quoting is
    /// understood; wrap in `sh -c` for anything fancier.
    pub fn parse_command(line: &str) -> Result<Vec<String>> {
        let command: Vec<String> = line.split_whitespace().map(String::from).collect();
        if command.is_empty() {
            return Err(AutofixError::InvalidConfig(
                "stage command must not be empty".to_string(),
            ));
        }
        Ok(command)
    }

    /// Substitute placeholders for the given source file.
    ///
    /// `{file}` is the file name, `{stem}` the file name without extension
    /// and `{dir}` the containing directory. Stages run inside `{dir}`.
    pub fn resolve(&self, source: &Path) -> StageConfig {
        let file = source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = source
            .file_stem()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());

        let command = self
            .command
            .iter()
            .map(|arg| {
                arg.replace("{file}", &file)
                    .replace("{stem}", &stem)
                    .replace("{dir}", &dir)
            })
            .collect();

        StageConfig {
            name: self.name.clone(),
            command,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Build and run stages used to validate a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolchainConfig {
    pub build: StageConfig,
    pub run: StageConfig,
}

impl ToolchainConfig {
    pub fn from_builtin(toolchain: BuiltinToolchain) -> Self {
        Self {
            build: StageConfig::from_builtin(
                toolchain,
                StageKind::Build,
                DEFAULT_BUILD_TIMEOUT_SECS,
            ),
            run: StageConfig::from_builtin(toolchain, StageKind::Run, DEFAULT_RUN_TIMEOUT_SECS),
        }
    }

    pub fn custom(build: Vec<String>, run: Vec<String>) -> Self {
        Self {
            build: StageConfig::custom("build".to_string(), build, DEFAULT_BUILD_TIMEOUT_SECS),
            run: StageConfig::custom("run".to_string(), run, DEFAULT_RUN_TIMEOUT_SECS),
        }
    }

    pub fn with_timeouts(mut self, build_secs: u64, run_secs: u64) -> Self {
        self.build.timeout_secs = build_secs;
        self.run.timeout_secs = run_secs;
        self
    }

    /// Command lines in order, used for the run identity digest.
    pub fn command_lines(&self) -> Vec<String> {
        vec![self.build.command.join(" "), self.run.command.join(" ")]
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self::from_builtin(BuiltinToolchain::Java)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_builtin_toolchain_names() {
        assert_eq!(BuiltinToolchain::Java.name(), "java");
        assert_eq!(BuiltinToolchain::Rust.name(), "rust");
        assert_eq!(BuiltinToolchain::Python.name(), "python");
        assert_eq!(
            BuiltinToolchain::parse("Python3").unwrap(),
            BuiltinToolchain::Python
        );
        assert!(BuiltinToolchain::parse("cobol").is_err());
    }

    #[test]
    fn test_java_commands() {
        let build = BuiltinToolchain::Java.command(StageKind::Build);
        assert_eq!(build, vec!["javac", "{file}"]);
        let run = BuiltinToolchain::Java.command(StageKind::Run);
        assert_eq!(run, vec!["java", "{stem}"]);
    }

    #[test]
    fn test_resolve_placeholders() {
        let config = StageConfig::from_builtin(BuiltinToolchain::Rust, StageKind::Build, 10);
        let resolved = config.resolve(&PathBuf::from("src/app/main.rs"));
        assert_eq!(resolved.command, vec!["rustc", "main.rs", "-o", "main"]);

        let dir_stage = StageConfig::custom("ls".to_string(), vec!["ls".into(), "{dir}".into()], 5);
        assert_eq!(
            dir_stage.resolve(&PathBuf::from("src/app/main.rs")).command,
            vec!["ls", "src/app"]
        );
        assert_eq!(
            dir_stage.resolve(&PathBuf::from("Main.java")).command,
            vec!["ls", "."]
        );
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            StageConfig::parse_command("  javac  -Xlint {file} ").unwrap(),
            vec!["javac", "-Xlint", "{file}"]
        );
        assert!(StageConfig::parse_command("   ").is_err());
    }

    #[test]
    fn test_toolchain_config_default_is_java() {
        let config = ToolchainConfig::default();
        assert_eq!(config.build.name, "build");
        assert_eq!(config.build.timeout_secs, DEFAULT_BUILD_TIMEOUT_SECS);
        assert_eq!(config.run.command[0], "java");
        assert_eq!(config.command_lines(), vec!["javac {file}", "java {stem}"]);
    }

    #[test]
    fn test_with_timeouts() {
        let config = ToolchainConfig::default().with_timeouts(1, 2);
        assert_eq!(config.build.timeout_secs, 1);
        assert_eq!(config.run.timeout_secs, 2);
    }
}
