//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file
//! - `--namespace <ns>` / `-n`: Namespace to operate on (default `pages`)
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--json`: Machine-readable output

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// pagevault - Versioned page and attachment storage backed by git
#[derive(Parser, Debug)]
#[command(name = "pagevault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (overrides the standard search locations)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Namespace to operate on
    #[arg(short, long, global = true, default_value = "pages")]
    pub namespace: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Identity recorded on a commit.
///
/// Falls back to `[committer]` from the configuration when omitted.
#[derive(Args, Debug, Clone, Default)]
pub struct AuthorArgs {
    /// Author name
    #[arg(long)]
    pub author: Option<String>,

    /// Author email
    #[arg(long)]
    pub email: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a repository and a configuration pointing at it
    #[command(
        name = "init",
        after_help = "\
EXAMPLES:
    # New wiki repository, config written to ~/.pagevault/config.toml
    pagevault init /srv/wiki

    # Write the config somewhere else
    pagevault --config ./wiki.toml init ./wiki"
    )]
    Init {
        /// Working tree of the repository
        path: PathBuf,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Check whether a page exists
    Exists {
        /// Page name
        name: String,

        /// Revision to look at (default: HEAD)
        #[arg(long)]
        rev: Option<String>,
    },

    /// Print the content of a page
    Read {
        /// Page name
        name: String,

        /// Revision to read (default: HEAD)
        #[arg(long)]
        rev: Option<String>,
    },

    /// List the pages of the namespace
    List,

    /// Write a page and commit it
    #[command(
        name = "save",
        after_help = "\
EXAMPLES:
    # Content from a file
    pagevault save Home --file home.md -m \"first draft\" --author Alice --email alice@example.com

    # Content from stdin
    echo hello | pagevault save Hello -m init --author Alice --email alice@example.com"
    )]
    Save {
        /// Page name
        name: String,

        /// Read content from this file instead of stdin
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Commit message
        #[arg(short, long, default_value = "")]
        message: String,

        #[command(flatten)]
        author: AuthorArgs,
    },

    /// Rename a page
    Rename {
        /// Current page name
        from: String,

        /// New page name
        to: String,

        #[command(flatten)]
        author: AuthorArgs,
    },

    /// Delete a page
    Delete {
        /// Page name
        name: String,

        #[command(flatten)]
        author: AuthorArgs,
    },

    /// Show the revisions of a page, oldest first
    Log {
        /// Page name
        name: String,
    },

    /// Show the revisions of every page in the namespace
    Changes {
        /// Keep only the newest N changes (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },

    /// Show what changed in a page between two revisions
    Diff {
        /// Page name
        name: String,

        /// Older revision
        from: String,

        /// Newer revision
        #[arg(default_value = "HEAD")]
        to: String,
    },

    /// Manage page attachments
    Attach {
        #[command(subcommand)]
        action: AttachAction,
    },

    /// Show recent changes across all namespaces, grouped by day
    Feed {
        /// Number of entries (default: from config, 15)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    # Bash
    pagevault completion bash > ~/.local/share/bash-completion/completions/pagevault

    # Zsh
    pagevault completion zsh > ~/.zfunc/_pagevault"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Attachment subcommands.
#[derive(Subcommand, Debug)]
pub enum AttachAction {
    /// List the attachments of a page
    List {
        /// Page name
        page: String,
    },

    /// Print an attachment
    Read {
        /// Page name
        page: String,

        /// Attachment name
        name: String,

        /// Revision to read (default: HEAD)
        #[arg(long)]
        rev: Option<String>,
    },

    /// Store an attachment and commit it
    Save {
        /// Page name
        page: String,

        /// Attachment name
        name: String,

        /// Read content from this file instead of stdin
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Commit message
        #[arg(short, long, default_value = "")]
        message: String,

        #[command(flatten)]
        author: AuthorArgs,
    },

    /// Delete an attachment
    Delete {
        /// Page name
        page: String,

        /// Attachment name
        name: String,

        #[command(flatten)]
        author: AuthorArgs,
    },

    /// Show attachment revisions; every attachment of the page without a name
    Log {
        /// Page name
        page: String,

        /// Attachment name
        name: Option<String>,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pagevault", "list", "--namespace", "users", "--json"])
            .unwrap();
        assert_eq!(cli.namespace, "users");
        assert!(cli.json);
        assert!(matches!(cli.command, Command::List));
    }

    #[test]
    fn namespace_default() {
        let cli = Cli::try_parse_from(["pagevault", "read", "Home"]).unwrap();
        assert_eq!(cli.namespace, "pages");
    }

    #[test]
    fn save_arguments() {
        let cli = Cli::try_parse_from([
            "pagevault", "save", "Home", "-m", "hi", "--author", "Alice", "--email", "a@b.c",
        ])
        .unwrap();
        match cli.command {
            Command::Save {
                name,
                file,
                message,
                author,
            } => {
                assert_eq!(name, "Home");
                assert!(file.is_none());
                assert_eq!(message, "hi");
                assert_eq!(author.author.as_deref(), Some("Alice"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn diff_defaults_to_head() {
        let cli = Cli::try_parse_from(["pagevault", "diff", "Home", "abc123"]).unwrap();
        match cli.command {
            Command::Diff { to, .. } => assert_eq!(to, "HEAD"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn attach_log_without_name() {
        let cli = Cli::try_parse_from(["pagevault", "attach", "log", "Home"]).unwrap();
        match cli.command {
            Command::Attach {
                action: AttachAction::Log { page, name },
            } => {
                assert_eq!(page, "Home");
                assert!(name.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
