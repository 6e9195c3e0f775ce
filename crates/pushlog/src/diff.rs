use std::io::Write;

use anyhow::Result;
use colored::Colorize;

use pushlog_core::{DiffRequest, DiffService};
use pushlog_diff::{
    DataTree, DiffValue, EntityClass, EntityDiff, FileClass, FileDiff, Token, TokenClass,
};

pub async fn handle_diff_command(
    diffs: &DiffService,
    repo: String,
    from: String,
    to: String,
    json: bool,
) -> Result<()> {
    let tree = diffs.diff(DiffRequest::new(&repo, &from, &to)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else if tree.is_empty() {
        println!("{}", "No changes.".dimmed());
    } else {
        print_tree(&mut std::io::stdout(), &tree)?;
    }
    Ok(())
}

fn print_tree(out: &mut impl Write, tree: &DataTree<FileDiff>) -> Result<()> {
    for (path, node) in tree.entries() {
        let depth = path.matches('/').count();
        let indent = "  ".repeat(depth);
        let segment = path.rsplit('/').next().unwrap_or(&path);

        let Some(file) = &node.value else {
            writeln!(out, "{}{}/", indent, segment.bold())?;
            continue;
        };

        let mut header = format!("{}{} {}", indent, status_marker(file), segment);
        if let Some(origin) = file.renamed.as_deref().or(file.copied.as_deref()) {
            header.push_str(&format!(" {}", format!("(from {})", origin).dimmed()));
        }
        writeln!(out, "{}", header)?;

        match file.class {
            FileClass::Unparsable => {
                writeln!(out, "{}    {}", indent, "cannot parse".bright_yellow())?;
            }
            FileClass::EmptyDiff => {
                writeln!(out, "{}    {}", indent, "no entity changes".dimmed())?;
            }
            FileClass::File => {
                for line in file.lines.iter().flatten() {
                    writeln!(out, "{}    {}", indent, render_entity(line))?;
                }
            }
        }
    }
    Ok(())
}

fn status_marker(file: &FileDiff) -> String {
    let status = file.status.as_str();
    match status {
        "added" => status.bright_green().to_string(),
        "removed" => status.bright_red().to_string(),
        "changed" => status.bright_yellow().to_string(),
        _ => status.bright_blue().to_string(),
    }
}

fn render_entity(line: &EntityDiff) -> String {
    match line.class {
        EntityClass::Added => format!(
            "{} {} = {}",
            "+".bright_green(),
            line.entity,
            render_value(&line.newval)
        ),
        EntityClass::Removed => format!(
            "{} {} = {}",
            "-".bright_red(),
            line.entity,
            render_value(&line.oldval)
        ),
        EntityClass::Changed => format!(
            "{} {} = {} → {}",
            "~".bright_yellow(),
            line.entity,
            render_value(&line.oldval),
            render_value(&line.newval)
        ),
    }
}

fn render_value(value: &DiffValue) -> String {
    match value {
        DiffValue::Empty => String::new(),
        DiffValue::Tokens(tokens) => tokens.iter().map(render_token).collect(),
    }
}

fn render_token(token: &Token) -> String {
    match token.class {
        Some(TokenClass::Insert) => token.value.bright_green().underline().to_string(),
        Some(TokenClass::Delete) => token.value.bright_red().strikethrough().to_string(),
        Some(TokenClass::Replace) => token.value.bright_yellow().to_string(),
        Some(TokenClass::Equal) | None => token.value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushlog_vcs::{PathStatus, RevisionId};

    fn file(
        path: &str,
        status: PathStatus,
        class: FileClass,
        lines: Option<Vec<EntityDiff>>,
    ) -> FileDiff {
        FileDiff {
            path: path.to_string(),
            status,
            class,
            lines,
            renamed: None,
            copied: None,
            rev: RevisionId::new("0123456789abcdef0123456789abcdef01234567"),
        }
    }

    #[test]
    fn test_print_tree_nests_and_flags() {
        colored::control::set_override(false);
        let added = EntityDiff {
            class: EntityClass::Added,
            entity: "title".to_string(),
            oldval: DiffValue::Empty,
            newval: DiffValue::Tokens(vec![Token::plain("Browser")]),
        };
        let mut tree = DataTree::new();
        tree.insert(
            "browser/app.properties",
            file("browser/app.properties", PathStatus::Added, FileClass::File, Some(vec![added])),
        );
        tree.insert(
            "browser/notes.txt",
            file("browser/notes.txt", PathStatus::Changed, FileClass::Unparsable, None),
        );

        let mut out = Vec::new();
        print_tree(&mut out, &tree).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "browser/\n  added app.properties\n      + title = Browser\n  changed notes.txt\n      cannot parse\n"
        );
    }

    #[test]
    fn test_changed_entity_shows_both_sides() {
        colored::control::set_override(false);
        let line = EntityDiff {
            class: EntityClass::Changed,
            entity: "key".to_string(),
            oldval: DiffValue::Tokens(vec![Token::new(TokenClass::Equal, "Cruel")]),
            newval: DiffValue::Tokens(vec![
                Token::new(TokenClass::Equal, "Cruel"),
                Token::new(TokenClass::Insert, "le"),
            ]),
        };

        assert_eq!(render_entity(&line), "~ key = Cruel → Cruelle");
    }
}
