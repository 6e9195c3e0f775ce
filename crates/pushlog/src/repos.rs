use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use pushlog_db::{Database, NewRepository, RepositoryRecord};

#[derive(Subcommand, Debug)]
pub enum RepoAction {
    /// Track a repository
    Add {
        name: String,
        url: String,

        /// Name of the repository this one was forked from
        #[arg(long)]
        fork_of: Option<String>,
    },

    /// List tracked repositories
    List {
        /// Include archived repositories
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop polling a repository, keeping its history
    Archive { name: String },
}

pub fn handle_repo_command(db: &Database, action: RepoAction) -> Result<()> {
    match action {
        RepoAction::Add { name, url, fork_of } => {
            let fork_of = match fork_of {
                Some(parent) => Some(
                    db.repositories()
                        .get_by_name(&parent)?
                        .with_context(|| format!("Unknown repository '{}'", parent))?
                        .id,
                ),
                None => None,
            };
            let record = db
                .repositories()
                .create(&NewRepository {
                    name,
                    url,
                    fork_of,
                    forest: None,
                })
                .context("Failed to add repository")?;
            println!(
                "{} Tracking {} ({})",
                "✓".bright_green(),
                record.name.bright_cyan(),
                record.url.dimmed()
            );
        }
        RepoAction::List { all, json } => {
            let repositories = db.repositories().list(all)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&repositories)?);
            } else if repositories.is_empty() {
                println!("{}", "No repositories tracked.".dimmed());
            } else {
                print_repositories_table(&repositories);
            }
        }
        RepoAction::Archive { name } => {
            if !db.repositories().archive(&name)? {
                anyhow::bail!("Unknown repository '{}'", name);
            }
            println!("{} Archived {}", "✓".bright_green(), name.bright_cyan());
        }
    }

    Ok(())
}

fn print_repositories_table(repositories: &[RepositoryRecord]) {
    println!(
        "{:<24} {:<10} {:<14} {}",
        "NAME".dimmed(),
        "LAST PUSH".dimmed(),
        "FOREST".dimmed(),
        "URL".dimmed(),
    );

    for repo in repositories {
        let name = if repo.archived {
            format!("{} (archived)", repo.name).dimmed().to_string()
        } else {
            repo.name.clone()
        };
        println!(
            "{:<24} {:<10} {:<14} {}",
            name,
            repo.last_known_push,
            repo.forest.as_deref().unwrap_or("-"),
            repo.url
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_fork_and_archive() {
        let db = Database::open_in_memory().unwrap();

        handle_repo_command(
            &db,
            RepoAction::Add {
                name: "de".to_string(),
                url: "https://hg.example.com/de/".to_string(),
                fork_of: None,
            },
        )
        .unwrap();
        handle_repo_command(
            &db,
            RepoAction::Add {
                name: "de-beta".to_string(),
                url: "https://hg.example.com/beta/de/".to_string(),
                fork_of: Some("de".to_string()),
            },
        )
        .unwrap();

        let de = db.repositories().get_by_name("de").unwrap().unwrap();
        let beta = db.repositories().get_by_name("de-beta").unwrap().unwrap();
        assert_eq!(beta.fork_of, Some(de.id));

        handle_repo_command(&db, RepoAction::Archive { name: "de-beta".to_string() }).unwrap();
        assert_eq!(db.repositories().list(false).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_names_fail() {
        let db = Database::open_in_memory().unwrap();

        let err = handle_repo_command(
            &db,
            RepoAction::Add {
                name: "fr".to_string(),
                url: "https://hg.example.com/fr/".to_string(),
                fork_of: Some("nope".to_string()),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("nope"));

        let archive = RepoAction::Archive {
            name: "nope".to_string(),
        };
        assert!(handle_repo_command(&db, archive).is_err());
    }
}
