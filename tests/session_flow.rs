//! End-to-end session behavior against file-backed catalogs.

use std::time::Duration;

use style_repo_search::catalog::{CatalogLoadError, FileCatalogSource};
use style_repo_search::config::SearchConfig;
use style_repo_search::search::{InlineBackend, QueryDelta, SearchWorker};
use style_repo_search::session::{CatalogState, MemoryLocation, SearchSession, SessionError};

mod util;
use util::TempFixtureDir;

fn config() -> SearchConfig {
    SearchConfig::default().with_debounce_ms(150)
}

fn names(session: &SearchSession<InlineBackend>) -> Vec<String> {
    session
        .snapshot()
        .expect("snapshot")
        .names()
        .map(str::to_string)
        .collect()
}

async fn loaded(location: &str) -> (TempFixtureDir, SearchSession<InlineBackend>) {
    let fixtures = TempFixtureDir::new();
    let path = fixtures.catalog();
    let mut session = SearchSession::new(
        &config(),
        location,
        InlineBackend::default(),
        MemoryLocation::default(),
    );
    session
        .load(&FileCatalogSource::new(path))
        .await
        .expect("catalog loads");
    session.publisher().settled().await;
    (fixtures, session)
}

#[tokio::test(start_paused = true)]
async fn initial_location_drives_first_result() {
    let (_fixtures, session) = loaded("https://example.org/styles?fields=biology&dependent=0").await;

    assert_eq!(session.state(), CatalogState::Ready);
    assert_eq!(names(&session), ["nature"]);
    let snapshot = session.snapshot().expect("snapshot");
    assert_eq!(snapshot.facet_formats, ["numeric"]);
    assert_eq!(snapshot.facet_fields, ["biology", "science"]);
}

#[tokio::test(start_paused = true)]
async fn unconstrained_session_lists_everything() {
    let (_fixtures, session) = loaded("").await;

    let snapshot = session.snapshot().expect("snapshot");
    assert_eq!(snapshot.count, 9);
    assert_eq!(
        snapshot.facet_formats,
        ["author", "author-date", "note", "numeric"]
    );
    assert!(session.location().current().is_empty());
}

#[tokio::test(start_paused = true)]
async fn toggles_update_results_and_location() {
    let (_fixtures, mut session) = loaded("").await;

    assert!(session.toggle_format("author-date").expect("toggle"));
    session.publisher().settled().await;
    assert_eq!(names(&session), ["apa", "apa-short", "cell"]);
    assert_eq!(session.location().current(), "?format=author-date");

    assert!(session.toggle_field("psychology").expect("toggle"));
    assert!(session.set_unique_only(true).expect("unique"));
    session.publisher().settled().await;
    assert_eq!(names(&session), ["apa"]);
    assert_eq!(
        session.location().current(),
        "?fields=psychology&format=author-date&dependent=0"
    );

    // Clicking the active format clears it.
    assert!(session.toggle_format("author-date").expect("toggle"));
    assert!(session.toggle_field("psychology").expect("toggle"));
    assert!(session.set_unique_only(false).expect("unique"));
    session.publisher().settled().await;
    assert_eq!(session.snapshot().expect("snapshot").count, 9);
    assert_eq!(session.location().current(), "");
}

#[tokio::test(start_paused = true)]
async fn unchanged_update_is_a_no_op() {
    let (_fixtures, mut session) = loaded("?q=apa").await;
    let applied = session.publisher().applied_seq();

    assert!(!session.set_search("apa").expect("update"));
    assert!(!session.update(QueryDelta::default()).expect("update"));
    session.publisher().settled().await;
    assert_eq!(session.publisher().applied_seq(), applied);
}

#[tokio::test(start_paused = true)]
async fn typing_is_debounced_but_location_follows_each_keystroke() {
    let (_fixtures, mut session) = loaded("").await;
    let before = session.publisher().applied_seq();

    for text in ["j", "ja", "jam"] {
        session.set_search(text).expect("typing");
        assert_eq!(session.location().current(), format!("?q={text}"));
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    assert!(session.publisher().has_pending_keystroke());
    assert_eq!(session.publisher().applied_seq(), before);

    session.publisher().settled().await;
    assert_eq!(session.publisher().applied_seq(), before + 1);
    assert_eq!(names(&session), ["jama"]);
}

#[tokio::test(start_paused = true)]
async fn clearing_the_search_box_is_immediate() {
    let (_fixtures, mut session) = loaded("?q=law").await;
    assert_eq!(names(&session), ["bluebook-law-review"]);

    session.set_search("").expect("clear");
    assert!(!session.publisher().has_pending_keystroke());
    session.publisher().settled().await;
    assert_eq!(session.snapshot().expect("snapshot").count, 9);
}

#[tokio::test(start_paused = true)]
async fn selecting_a_style_narrows_by_id() {
    let (_fixtures, mut session) = loaded("?format=author-date").await;

    session.select_style("apa-short").expect("select");
    assert!(!session.publisher().has_pending_keystroke());
    session.publisher().settled().await;
    assert_eq!(names(&session), ["apa-short"]);
    assert_eq!(
        session.location().current(),
        "?q=id%3Aapa-short&format=author-date"
    );
}

#[tokio::test(start_paused = true)]
async fn embedded_id_overrides_explicit_id() {
    let (_fixtures, session) = loaded("?id=apa&q=id:jama").await;
    assert_eq!(names(&session), ["jama"]);
}

#[tokio::test(start_paused = true)]
async fn no_matches_is_an_empty_result_not_an_error() {
    let (_fixtures, session) = loaded("?q=zzzz-no-such-style").await;
    let snapshot = session.snapshot().expect("snapshot");
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.count, 0);
    assert!(snapshot.facet_formats.is_empty());
    assert!(snapshot.facet_fields.is_empty());
}

#[tokio::test]
async fn failed_load_is_terminal() {
    let fixtures = TempFixtureDir::new();
    let broken = fixtures.write("styles.json", "{ not json");
    let mut session = SearchSession::new(
        &config(),
        "?q=apa",
        InlineBackend::default(),
        MemoryLocation::default(),
    );

    let err = session
        .load(&FileCatalogSource::new(&broken))
        .await
        .expect_err("broken listing");
    assert!(matches!(
        err,
        SessionError::CatalogLoad(CatalogLoadError::Decode(_))
    ));
    assert_eq!(session.state(), CatalogState::Failed);
    assert!(session.snapshot().is_none());

    // No retry, even once the file is fixed.
    let fixed = fixtures.catalog();
    assert!(matches!(
        session.load(&FileCatalogSource::new(fixed)).await,
        Err(SessionError::CatalogUnavailable)
    ));
    assert!(matches!(
        session.set_search("nature"),
        Err(SessionError::CatalogUnavailable)
    ));
}

#[tokio::test]
async fn catalog_loads_only_once() {
    let (fixtures, mut session) = loaded("").await;
    let again = session.load(&FileCatalogSource::new(fixtures.catalog())).await;
    assert!(matches!(again, Err(SessionError::AlreadyLoaded)));
}

#[tokio::test]
async fn edits_before_load_are_kept_for_the_first_search() {
    let fixtures = TempFixtureDir::new();
    let mut session = SearchSession::new(
        &config(),
        "",
        InlineBackend::default(),
        MemoryLocation::default(),
    );
    session.toggle_field("law").expect("toggle");
    assert_eq!(session.location().current(), "?fields=law");
    assert!(session.snapshot().is_none());

    session
        .load(&FileCatalogSource::new(fixtures.catalog()))
        .await
        .expect("load");
    session.publisher().settled().await;
    assert_eq!(
        session
            .snapshot()
            .expect("snapshot")
            .names()
            .collect::<Vec<_>>(),
        ["bluebook-law-review"]
    );
}

#[tokio::test]
async fn worker_thread_backend_serves_a_session() {
    let fixtures = TempFixtureDir::new();
    let worker = SearchWorker::spawn().expect("worker");
    let mut session = SearchSession::new(
        &config(),
        "?format=numeric&dependent=1",
        worker,
        MemoryLocation::default(),
    );
    session
        .load(&FileCatalogSource::new(fixtures.catalog()))
        .await
        .expect("load");
    session.publisher().settled().await;

    let snapshot = session.snapshot().expect("snapshot");
    assert_eq!(snapshot.names().collect::<Vec<_>>(), ["nature"]);
    assert!(snapshot.matched[0].dependent);
    assert!(snapshot.matched[0].disambiguate);
}
