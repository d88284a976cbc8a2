//! CLI command definitions

use clap::Args;

/// Dispatch a push event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pushed reference, e.g. refs/tags/v1.2.3
    #[arg(long = "ref")]
    pub reference: String,

    /// Repository to check out (clone URL or path)
    #[arg(long)]
    pub repository: String,

    /// Commit the tag points at
    #[arg(long)]
    pub sha: Option<String>,

    /// Path to pipeline YAML file (defaults to the stock release workflow)
    #[arg(short, long)]
    pub file: Option<String>,

    /// Extra job environment variables (KEY=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Evaluate the trigger for a reference
#[derive(Debug, Args, Clone)]
pub struct MatchCommand {
    /// Pushed reference, e.g. refs/tags/v1.2.3
    #[arg(long = "ref")]
    pub reference: String,

    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details of a run
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("A=b=c"),
            Ok(("A".to_string(), "b=c".to_string()))
        );
        assert_eq!(parse_key_value("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
