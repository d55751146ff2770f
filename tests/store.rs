#[path = "common/mod.rs"]
mod common;

use common::*;
use helpdesk_export::{
    Category, CategoryKey, Comment, Discussion, EntityKind, ExportError, KbArticle, Outcome, Section, SectionKey,
    User, WriteMode,
};
use serde_json::json;
use std::fs;
use std::time::{Duration, Instant};

fn user(email: &str) -> User {
    User { email: Some(email.into()), ..Default::default() }
}

fn discussion(title: &str, author: &str) -> Discussion {
    Discussion {
        title: title.into(),
        author_email: Some(author.into()),
        comments: vec![Comment { body: "first".into(), author_email: Some(author.into()), ..Default::default() }],
        ..Default::default()
    }
}

fn category(name: &str) -> Category {
    Category { name: name.into(), summary: None }
}

/// `state` defaults to "user" and the user lands at users/<normalized email>.json.
#[test]
fn add_user_defaults_state_and_writes_through() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);

    let stored = store.add_user(user("a@x.com")).unwrap().stored().expect("accepted");
    assert_eq!(stored.state.as_deref(), Some("user"));

    let support = User { state: Some("support".into()), ..user("b@x.com") };
    let stored = store.add_user(support).unwrap().stored().unwrap();
    assert_eq!(stored.state.as_deref(), Some("support"), "caller's state wins");

    let path = store.session().export_dir().join("users").join("a_x_com.json");
    let v = read_entity(&path);
    assert_eq!(v["email"], "a@x.com");
    assert_eq!(v["state"], "user");
    assert_eq!(store.stats().accepted(EntityKind::User), 2);
    assert!(store.report().is_empty());
}

/// A user without email is dropped, counted as invalid and reported exactly once.
#[test]
fn add_user_without_email_is_reported_once() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);

    let outcome = store.add_user(User { name: Some("Nobody".into()), ..Default::default() }).unwrap();
    assert!(!outcome.is_stored());
    assert_eq!(outcome.problems(), ["Missing email".to_string()]);

    let mentions = store.report().iter().filter(|l| l.contains("Missing email")).count();
    assert_eq!(mentions, 1);
    assert_eq!(store.stats().get("invalid:user"), 1);
    assert_eq!(store.stats().accepted(EntityKind::User), 0);
    assert!(!store.session().export_dir().join("users").exists());
}

/// Discussions are numbered 1, 2, 3 per category, independent of other categories.
#[test]
fn discussion_numbers_are_per_category() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);
    let tacos = store.add_category(category("Tacos")).unwrap().stored().unwrap();
    let burritos = store.add_category(category("Burritos")).unwrap().stored().unwrap();
    assert_eq!(tacos.as_key(), "category:tacos");

    let mut numbers = Vec::new();
    numbers.push(store.add_discussion(Some(&tacos), discussion("t1", "a@x.com")).unwrap());
    numbers.push(store.add_discussion(Some(&burritos), discussion("b1", "a@x.com")).unwrap());
    numbers.push(store.add_discussion(Some(&tacos), discussion("t2", "a@x.com")).unwrap());
    numbers.push(store.add_discussion(Some(&burritos), discussion("b2", "a@x.com")).unwrap());
    numbers.push(store.add_discussion(Some(&tacos), discussion("t3", "a@x.com")).unwrap());
    let numbers: Vec<u64> = numbers.into_iter().map(|o| o.stored().unwrap()).collect();
    assert_eq!(numbers, vec![1, 1, 2, 2, 3]);

    let root = store.session().export_dir();
    for (n, title) in [(1, "t1"), (2, "t2"), (3, "t3")] {
        let v = read_entity(&root.join("categories").join("tacos").join(format!("{n}.json")));
        assert_eq!(v["title"], title);
    }
    assert_eq!(read_entity(&root.join("categories/burritos/2.json"))["title"], "b2");
    assert_eq!(store.stats().accepted(EntityKind::Discussion), 5);
}

/// A rejected discussion does not consume a number.
#[test]
fn rejected_discussions_leave_no_gap() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);
    let key = store.add_category(category("Tacos")).unwrap().stored().unwrap();

    let no_comments = Discussion { comments: vec![], ..discussion("empty", "a@x.com") };
    assert!(!store.add_discussion(Some(&key), no_comments).unwrap().is_stored());

    let anonymous_comment = Discussion {
        comments: vec![Comment { body: "?".into(), author_email: Some(String::new()), ..Default::default() }],
        ..discussion("anon", "a@x.com")
    };
    let outcome = store.add_discussion(Some(&key), anonymous_comment).unwrap();
    assert_eq!(outcome, Outcome::Rejected(vec!["Comment 1: Missing author_email".to_string()]));

    assert_eq!(store.add_discussion(Some(&key), discussion("ok", "a@x.com")).unwrap(), Outcome::Stored(1));
    assert_eq!(store.report().len(), 2);
    assert_eq!(store.stats().invalid(EntityKind::Discussion), 2);
    assert_eq!(list_files(&store.session().export_dir().join("categories")), vec!["tacos.json", "tacos/1.json"]);
}

/// A missing parent key is a caller bug: fatal, not a report line.
#[test]
fn add_discussion_without_category_is_fatal() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);

    let err = store.add_discussion(None, discussion("t", "a@x.com")).unwrap_err();
    assert!(matches!(err.downcast_ref::<ExportError>(), Some(ExportError::MissingParent { .. })));

    let never_added = CategoryKey::from_name("Ghosts");
    let err = store.add_discussion(Some(&never_added), discussion("t", "a@x.com")).unwrap_err();
    assert!(matches!(err.downcast_ref::<ExportError>(), Some(ExportError::UnknownParent { .. })));

    let err = store.add_kb(None, KbArticle::default()).unwrap_err();
    assert!(matches!(err.downcast_ref::<ExportError>(), Some(ExportError::MissingParent { .. })));

    let never_added = SectionKey::from_title("Ghosts");
    let article = KbArticle { title: "t".into(), body: "b".into(), ..Default::default() };
    let err = store.add_kb(Some(&never_added), article).unwrap_err();
    assert!(matches!(err.downcast_ref::<ExportError>(), Some(ExportError::UnknownParent { .. })));

    assert!(store.report().is_empty());
    assert!(store.stats().is_empty());
}

#[test]
fn sections_and_articles() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);
    let key = store
        .add_section(Section { title: "Getting Started".into(), summary: Some("basics".into()) })
        .unwrap()
        .stored()
        .unwrap();
    assert_eq!(key.as_key(), "section:getting_started");

    let article = KbArticle { title: "Install".into(), body: "Run it.".into(), ..Default::default() };
    assert_eq!(store.add_kb(Some(&key), article).unwrap(), Outcome::Stored(1));
    let untitled = KbArticle { body: "text".into(), ..Default::default() };
    assert!(!store.add_kb(Some(&key), untitled).unwrap().is_stored());

    let root = store.session().export_dir();
    assert_eq!(list_files(root), vec!["sections/getting_started.json", "sections/getting_started/1.json"]);
    assert_eq!(read_entity(&root.join("sections/getting_started/1.json"))["body"], "Run it.");
    assert_eq!(store.stats().get("kb"), 1);
    assert_eq!(store.stats().get("invalid:kb"), 1);
}

/// Colliding category ids overwrite the category file but keep numbering going.
#[test]
fn colliding_categories_overwrite_but_keep_counter() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);
    let first = store.add_category(category("Tacos!")).unwrap().stored().unwrap();
    store.add_discussion(Some(&first), discussion("one", "a@x.com")).unwrap();

    let second = store.add_category(category("Tacos?")).unwrap().stored().unwrap();
    assert_eq!(first, second);
    assert_eq!(store.add_discussion(Some(&second), discussion("two", "a@x.com")).unwrap(), Outcome::Stored(2));

    let root = store.session().export_dir();
    assert_eq!(read_entity(&root.join("categories/tacos_.json"))["name"], "Tacos?");
}

/// Feed the same sequence to both modes and compare the packaged trees byte for byte.
#[test]
fn buffered_and_write_through_produce_identical_trees() {
    let mut trees = Vec::new();
    for mode in [WriteMode::WriteThrough, WriteMode::Buffered] {
        let (tmp, mut store) = new_store(mode);
        store.add_user(user("a@x.com")).unwrap();
        store.add_user(User::default()).unwrap();
        let key = store.add_category(category("Tacos!")).unwrap().stored().unwrap();
        store.add_discussion(Some(&key), discussion("one", "a@x.com")).unwrap();
        store.add_category(category("tacos?")).unwrap();
        store.add_discussion(Some(&key), discussion("two", "a@x.com")).unwrap();

        if mode == WriteMode::Buffered {
            assert!(list_files(store.session().export_dir()).is_empty(), "buffered mode writes nothing early");
        }

        let snapshot = tmp.path().join("snapshot");
        let archive = store.write_archive(&SnapshotArchiver::new(&snapshot)).unwrap();
        assert!(archive.ends_with("export_acme.tgz"));
        assert!(!store.session().export_dir().exists(), "export dir removed after packaging");

        let files = list_files(&snapshot);
        let contents: Vec<(String, Vec<u8>)> =
            files.iter().map(|f| (f.clone(), fs::read(snapshot.join(f)).unwrap())).collect();
        trees.push(contents);
    }
    assert_eq!(trees[0], trees[1]);
    let names: Vec<&str> = trees[0].iter().map(|(f, _)| f.as_str()).collect();
    assert_eq!(names, vec!["categories/tacos_.json", "categories/tacos_/1.json", "categories/tacos_/2.json", "users/a_x_com.json"]);
}

/// A packaging failure leaves no archive file behind and the store can still be discarded.
#[test]
fn failed_packaging_leaves_no_archive() {
    let (_tmp, mut store) = new_store(WriteMode::Buffered);
    store.add_user(user("a@x.com")).unwrap();

    assert!(store.write_archive(&FailingArchiver).is_err());
    assert!(!store.session().archive_path().exists());

    store.discard().unwrap();
    assert!(!store.session().export_dir().exists());
}

#[test]
fn nothing_is_accepted_after_packaging() {
    let (tmp, mut store) = new_store(WriteMode::WriteThrough);
    store.write_archive(&SnapshotArchiver::new(&tmp.path().join("snap"))).unwrap();
    assert!(store.add_user(user("late@x.com")).is_err());
    assert!(store.write_archive(&SnapshotArchiver::new(&tmp.path().join("snap2"))).is_err());
}

#[test]
fn stats_render_sorted_lines() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);
    store.add_user(user("a@x.com")).unwrap();
    store.add_user(User::default()).unwrap();
    store.add_category(category("Tacos")).unwrap();
    assert_eq!(store.stats().to_string(), "category: 1\ninvalid:user: 1\nuser: 1\n");
}

/// Undecodable records and children dropped with their parent land in the report
/// and in stats, next to ordinary rejections.
#[test]
fn undecodable_and_skipped_records_are_reported() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);
    let raw = json!({"id": null, "roles": "admin"});
    store.reject_undecodable(EntityKind::User, "roles is not a number", &raw);
    store.skip_children(EntityKind::Discussion, 3, "entries of rejected forum 10");

    assert_eq!(
        store.report(),
        [
            r#"Invalid user: Undecodable record (roles is not a number): {"id":null,"roles":"admin"}"#.to_string(),
            "Skipped 3 discussion: entries of rejected forum 10".to_string(),
        ]
    );
    assert_eq!(store.stats().invalid(EntityKind::User), 1);
    assert_eq!(store.stats().skipped(EntityKind::Discussion), 3);
    assert_eq!(store.stats().to_string(), "invalid:user: 1\nskipped:discussion: 3\n");
}

/// A hard I/O error (here EISDIR: a directory squats on the entity path) fails
/// at once instead of being retried like a Windows sharing violation.
#[cfg(unix)]
#[test]
fn hard_io_errors_are_not_retried() {
    let (_tmp, mut store) = new_store(WriteMode::WriteThrough);
    let squatter = store.session().export_dir().join("users").join("a_x_com.json");
    fs::create_dir_all(&squatter).unwrap();

    let started = Instant::now();
    assert!(store.add_user(user("a@x.com")).is_err());
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}
