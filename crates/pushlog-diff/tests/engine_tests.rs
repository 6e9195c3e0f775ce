use std::fs;
use std::path::Path;

use git2::{Commit, Oid, Repository, Signature};
use pushlog_diff::{DiffValue, EntityClass, EntityDiffEngine, FileClass, TokenClass};
use pushlog_vcs::{GitClient, PathStatus, PathTracker, VcsClient, WorkingCopy};
use serde_json::json;
use tempfile::TempDir;

/// Helper: write/remove files and commit them on HEAD.
fn commit(repo: &Repository, changes: &[(&str, Option<&[u8]>)]) -> String {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (path, content) in changes {
        let full = workdir.join(path);
        match content {
            Some(content) => {
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(&full, content).unwrap();
                index.add_path(Path::new(path)).unwrap();
            }
            None => {
                fs::remove_file(&full).unwrap();
                index.remove_path(Path::new(path)).unwrap();
            }
        }
    }
    index.write().unwrap();

    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Jane Doe", "jane@example.com").unwrap();
    let parents: Vec<Commit> = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => vec![],
    };
    let parent_refs: Vec<&Commit> = parents.iter().collect();
    let oid: Oid = repo
        .commit(Some("HEAD"), &sig, &sig, "change", &tree, &parent_refs)
        .unwrap();
    oid.to_string()
}

fn setup() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    (dir, repo)
}

fn open(dir: &TempDir) -> Box<dyn WorkingCopy> {
    GitClient::new().open(dir.path()).unwrap()
}

const DTD: &[u8] = b"<!ENTITY key1 \"Hello\">
<!ENTITY key2 \"Cruel\">
<!ENTITY key3 \"World\">
<!ENTITY key4 \"Goodbye\">
<!ENTITY key5 \"Farewell to the whole wide world\">
<!ENTITY key6 \"See you again another time\">
<!ENTITY key7 \"Open the downloads folder\">
<!ENTITY key8 \"Clear the list of downloads\">
<!ENTITY key9 \"Pause every active download\">
<!ENTITY key10 \"Resume every paused download\">
";

#[test]
fn test_changed_file_entities() {
    let (dir, git) = setup();
    let from = commit(&git, &[("file.dtd", Some(DTD))]);
    let edited = String::from_utf8(DTD.to_vec())
        .unwrap()
        .replace("\"Cruel\"", "\"Cruelle\"");
    let to = commit(&git, &[("file.dtd", Some(edited.as_bytes()))]);

    let repo = open(&dir);
    let changed = PathTracker::new(repo.as_ref()).paths(&from, &to).unwrap();
    let engine = EntityDiffEngine::new(repo.as_ref(), &changed);

    let lines = engine
        .diff_lines("file.dtd", PathStatus::Changed)
        .unwrap()
        .unwrap();

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].entity, "key2");
    assert_eq!(lines[0].class, EntityClass::Changed);
    assert_eq!(
        serde_json::to_value(&lines[0].newval).unwrap(),
        json!([
            {"class": "equal", "value": "Cruel"},
            {"class": "insert", "value": "le"}
        ])
    );
}

#[test]
fn test_new_file_lists_every_entity() {
    let (dir, git) = setup();
    let from = commit(&git, &[("README", Some(b"readme\n".as_slice()))]);
    let to = commit(&git, &[("file.dtd", Some(DTD))]);

    let repo = open(&dir);
    let changed = PathTracker::new(repo.as_ref()).paths(&from, &to).unwrap();
    let diffs = EntityDiffEngine::new(repo.as_ref(), &changed).diff_all().unwrap();

    assert_eq!(diffs.len(), 1);
    let file = &diffs[0];
    assert_eq!(file.status, PathStatus::Added);
    assert_eq!(file.class, FileClass::File);
    assert_eq!(file.rev.as_str(), to);

    let lines = file.lines.as_ref().unwrap();
    assert_eq!(lines.len(), 10);
    assert!(lines.iter().all(|l| l.class == EntityClass::Added));
    assert!(lines.iter().all(|l| l.oldval == DiffValue::Empty));
}

#[test]
fn test_removed_file_shown_at_from() {
    let (dir, git) = setup();
    let from = commit(
        &git,
        &[("file.dtd", Some(DTD)), ("README", Some(b"readme\n".as_slice()))],
    );
    let to = commit(&git, &[("file.dtd", None)]);

    let repo = open(&dir);
    let changed = PathTracker::new(repo.as_ref()).paths(&from, &to).unwrap();
    let diffs = EntityDiffEngine::new(repo.as_ref(), &changed).diff_all().unwrap();

    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].status, PathStatus::Removed);
    assert_eq!(diffs[0].rev.as_str(), from);
    let lines = diffs[0].lines.as_ref().unwrap();
    assert_eq!(lines.len(), 10);
    assert!(lines.iter().all(|l| l.class == EntityClass::Removed));
}

#[test]
fn test_file_without_parser_is_flagged() {
    let (dir, git) = setup();
    let from = commit(&git, &[("file.txt", Some(b"some text\n".as_slice()))]);
    let to = commit(&git, &[("file.txt", Some(b"other text\n".as_slice()))]);

    let repo = open(&dir);
    let changed = PathTracker::new(repo.as_ref()).paths(&from, &to).unwrap();
    let engine = EntityDiffEngine::new(repo.as_ref(), &changed);

    assert_eq!(engine.diff_lines("file.txt", PathStatus::Changed).unwrap(), None);
    let file = engine.file_diff("file.txt", PathStatus::Changed).unwrap();
    assert_eq!(file.class, FileClass::Unparsable);
}

#[test]
fn test_broken_content_on_either_side() {
    let (dir, git) = setup();
    let good = commit(&git, &[("file.properties", Some(b"key1 = fine\n".as_slice()))]);
    let broken = commit(
        &git,
        &[("file.properties", Some(b"key1 = fine\nno separator here\n".as_slice()))],
    );
    let bad_encoding = commit(
        &git,
        &[("file.properties", Some(b"key1 = \xe9t\xe9\n".as_slice()))],
    );

    let repo = open(&dir);
    for (from, to) in [(&good, &broken), (&broken, &good), (&good, &bad_encoding)] {
        let changed = PathTracker::new(repo.as_ref()).paths(from, to).unwrap();
        let engine = EntityDiffEngine::new(repo.as_ref(), &changed);
        assert_eq!(
            engine
                .diff_lines("file.properties", PathStatus::Changed)
                .unwrap(),
            None
        );
    }
}

#[test]
fn test_renamed_and_edited_file() {
    let (dir, git) = setup();
    let from = commit(&git, &[("file.dtd", Some(DTD))]);
    let edited = String::from_utf8(DTD.to_vec())
        .unwrap()
        .replace("\"World\"", "\"Universe\"");
    let to = commit(
        &git,
        &[("file.dtd", None), ("newnamefile.dtd", Some(edited.as_bytes()))],
    );

    let repo = open(&dir);
    let changed = PathTracker::new(repo.as_ref()).paths(&from, &to).unwrap();
    let diffs = EntityDiffEngine::new(repo.as_ref(), &changed).diff_all().unwrap();

    assert_eq!(diffs.len(), 1);
    let file = &diffs[0];
    assert_eq!(file.path, "newnamefile.dtd");
    assert_eq!(file.status, PathStatus::Moved);
    assert_eq!(file.renamed.as_deref(), Some("file.dtd"));
    assert_eq!(file.copied, None);

    let lines = file.lines.as_ref().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].entity, "key3");
    let DiffValue::Tokens(old) = &lines[0].oldval else {
        panic!("expected old tokens");
    };
    assert!(old.iter().any(|t| t.class == Some(TokenClass::Replace)));
}

#[test]
fn test_only_copied_file_has_empty_diff() {
    let (dir, git) = setup();
    let from = commit(&git, &[("file.dtd", Some(DTD))]);
    let to = commit(&git, &[("copied.dtd", Some(DTD))]);

    let repo = open(&dir);
    let changed = PathTracker::new(repo.as_ref()).paths(&from, &to).unwrap();
    let diffs = EntityDiffEngine::new(repo.as_ref(), &changed).diff_all().unwrap();

    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].status, PathStatus::Copied);
    assert_eq!(diffs[0].copied.as_deref(), Some("file.dtd"));
    assert_eq!(diffs[0].class, FileClass::EmptyDiff);
}

#[test]
fn test_tree_json_nests_paths() {
    let (dir, git) = setup();
    let from = commit(&git, &[("README", Some(b"readme\n".as_slice()))]);
    let to = commit(
        &git,
        &[("browser/chrome/app.properties", Some(b"title = Browser\n".as_slice()))],
    );

    let repo = open(&dir);
    let changed = PathTracker::new(repo.as_ref()).paths(&from, &to).unwrap();
    let tree = EntityDiffEngine::new(repo.as_ref(), &changed)
        .diff_tree()
        .unwrap();

    let json = serde_json::to_value(&tree).unwrap();
    let browser = &json["children"][0];
    assert_eq!(browser["segment"], "browser");
    let chrome = &browser["children"][0];
    assert_eq!(chrome["path"], "browser/chrome");
    let file = &chrome["children"][0];
    assert_eq!(file["path"], "browser/chrome/app.properties");
    assert_eq!(file["value"]["class"], "file");
    assert_eq!(file["value"]["status"], "added");
    assert_eq!(
        file["value"]["lines"],
        json!([{
            "class": "added",
            "entity": "title",
            "oldval": "",
            "newval": [{"value": "Browser"}]
        }])
    );
}
