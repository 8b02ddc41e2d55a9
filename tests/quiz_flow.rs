use chrono::NaiveDate;
use cloze_stats::{
    Browser, Error, FixedClock, Grader, KeyValueStore, LocalStorage, LocationNavigationKind, Page,
    PageKind, QuizConfig, Result, ScoreRecord, ScoreRepository, SourceParam,
};

const QUIZ_HTML: &str = r#"
<!DOCTYPE html>
<html>
<head><title>Rust (programming language)</title></head>
<body>
  <div id="content">
    <p>
      Rust was designed by
      <span id="A"><select><option value="">--</option><option>A</option><option>X</option></select></span>,
      first appeared in
      <span id="B"><select><option value="">--</option><option>B</option><option>X</option></select></span>
      and is maintained by
      <span id="C"><select><option value="">--</option><option>C</option><option>X</option></select></span>.
    </p>
  </div>
</body>
</html>
"#;

const QUIZ_URL: &str = "http://localhost:4567/wiki?url=https://en.wikipedia.org/wiki/Rust_(programming_language)&cloze=noun";

fn fixed_clock() -> Result<FixedClock> {
    NaiveDate::from_ymd_opt(2026, 3, 7)
        .and_then(|date| date.and_hms_opt(19, 5, 9))
        .map(FixedClock)
        .ok_or_else(|| Error::Config("invalid fixture time".into()))
}

fn quiz_page(url: &str, storage: LocalStorage, config: QuizConfig) -> Result<Page> {
    let mut page = Page::from_html_with_url_and_local_storage(url, QUIZ_HTML, storage)?;
    page.add_script(Grader::new(config).with_clock(fixed_clock()?))?;
    Ok(page)
}

#[test]
fn install_appends_save_trigger_to_content() -> Result<()> {
    let page = quiz_page(QUIZ_URL, LocalStorage::new(), QuizConfig::default())?;
    page.assert_text("#content > #submit", "Save Statistics")?;
    assert_eq!(page.query_count("#submit")?, 1);
    Ok(())
}

#[test]
fn grading_marks_slots_and_disables_selects() -> Result<()> {
    let mut page = quiz_page(QUIZ_URL, LocalStorage::new(), QuizConfig::default())?;

    page.select_option("#A select", "A")?;
    page.assert_class("#A", "answer", true)?;
    page.assert_class("#A", "correct", true)?;
    page.assert_class("#A", "wrong", false)?;
    page.assert_disabled("#A select", true)?;

    page.select_option("#B select", "X")?;
    page.assert_class("#B", "answer", true)?;
    page.assert_class("#B", "wrong", true)?;
    page.assert_class("#B", "correct", false)?;

    page.assert_class("#C", "answer", false)?;
    page.assert_disabled("#C select", false)?;
    Ok(())
}

#[test]
fn saving_two_of_three_correct_records_067_and_navigates() -> Result<()> {
    let storage = LocalStorage::new();
    let mut page = quiz_page(QUIZ_URL, storage.clone(), QuizConfig::default())?;

    page.select_option("#A select", "A")?;
    page.select_option("#B select", "X")?;
    page.select_option("#C select", "C")?;
    page.click("#submit")?;

    let history = ScoreRepository::new(storage).load();
    assert_eq!(
        history,
        vec![ScoreRecord::new(
            "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "0.67",
            "3/7/2026, 7:05:09 PM",
        )]
    );

    let navigations = page.take_location_navigations();
    assert_eq!(navigations.len(), 1);
    assert_eq!(navigations[0].kind, LocationNavigationKind::HrefSet);
    assert_eq!(navigations[0].to, "http://localhost:4567/stats");
    Ok(())
}

#[test]
fn saving_with_nothing_answered_scores_zero() -> Result<()> {
    let storage = LocalStorage::new();
    let mut page = quiz_page(QUIZ_URL, storage.clone(), QuizConfig::default())?;
    page.click("#submit")?;
    let history = ScoreRepository::new(storage).load();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].score, "0.00");
    Ok(())
}

#[test]
fn second_change_on_answered_slot_is_ignored() -> Result<()> {
    let storage = LocalStorage::new();
    let mut page = quiz_page(QUIZ_URL, storage.clone(), QuizConfig::default())?;

    page.select_option("#A select", "X")?;
    // The select is disabled now, so a user pick is a no-op.
    page.select_option("#A select", "A")?;
    page.assert_value("#A select", "X")?;
    // A forced event still does not regrade the slot.
    page.dispatch("#A select", "change")?;
    page.assert_class("#A", "wrong", true)?;
    page.assert_class("#A", "correct", false)?;

    let grader = page
        .script::<Grader>()
        .ok_or_else(|| Error::Script("grader missing".into()))?;
    assert_eq!(grader.answered(), 1);
    assert_eq!(grader.score(), 0);

    page.click("#submit")?;
    assert_eq!(ScoreRepository::new(storage).load()[0].score, "0.00");
    Ok(())
}

#[test]
fn saves_append_after_existing_history() -> Result<()> {
    let storage = LocalStorage::with_entries(&[("stats", r#"[{"url":"a","score":"1.00","date":"d1"}]"#)]);
    let mut page = quiz_page(QUIZ_URL, storage.clone(), QuizConfig::default())?;
    page.select_option("#A select", "A")?;
    page.click("#submit")?;

    let history = ScoreRepository::new(storage).load();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], ScoreRecord::new("a", "1.00", "d1"));
    assert_eq!(history[1].score, "1.00");
    Ok(())
}

#[test]
fn percent_encoded_source_is_decoded_like_decode_uri() -> Result<()> {
    let storage = LocalStorage::new();
    let url = "http://localhost:4567/wiki?url=https://de.wikipedia.org/wiki/K%C3%A4se%3Fx";
    let mut page = quiz_page(url, storage.clone(), QuizConfig::default())?;
    page.click("#submit")?;
    // decodeURI keeps reserved escapes such as %3F.
    assert_eq!(
        ScoreRepository::new(storage).load()[0].url,
        "https://de.wikipedia.org/wiki/Käse%3Fx"
    );
    Ok(())
}

#[test]
fn named_source_parameter_ignores_position() -> Result<()> {
    let storage = LocalStorage::new();
    let url = "http://localhost:4567/wiki?cloze=noun&url=https://en.wikipedia.org/wiki/Rust";
    let config = QuizConfig::default().with_source_param(SourceParam::Named("url".into()));
    let mut page = quiz_page(url, storage.clone(), config)?;
    page.click("#submit")?;
    assert_eq!(
        ScoreRepository::new(storage.clone()).load()[0].url,
        "https://en.wikipedia.org/wiki/Rust"
    );

    // Positional mode takes whatever comes first.
    let mut page = quiz_page(url, storage.clone(), QuizConfig::default())?;
    page.click("#submit")?;
    assert_eq!(ScoreRepository::new(storage).load()[1].url, "noun");
    Ok(())
}

#[test]
fn full_storage_fails_save_without_navigating() -> Result<()> {
    let storage = LocalStorage::with_entries(&[("stats", r#"[{"url":"a","score":"1.00","date":"d1"}]"#)]);
    storage.set_quota(Some(64));
    let mut page = quiz_page(QUIZ_URL, storage.clone(), QuizConfig::default())?;
    page.select_option("#A select", "A")?;

    assert!(matches!(page.click("#submit"), Err(Error::Storage(_))));
    assert!(page.take_location_navigations().is_empty());
    assert_eq!(
        storage.get_item("stats").as_deref(),
        Some(r#"[{"url":"a","score":"1.00","date":"d1"}]"#)
    );
    page.assert_class("#A", "correct", true)?;
    page.assert_exists("#submit")?;
    Ok(())
}

#[test]
fn disabled_storage_fails_save() -> Result<()> {
    let storage = LocalStorage::new();
    storage.set_disabled(true);
    let mut page = quiz_page(QUIZ_URL, storage, QuizConfig::default())?;
    assert!(matches!(page.click("#submit"), Err(Error::Storage(_))));
    assert!(page.take_location_navigations().is_empty());
    Ok(())
}

#[test]
fn browser_carries_score_from_quiz_to_history_page() -> Result<()> {
    let mut browser = Browser::new(QuizConfig::default())?.with_clock(fixed_clock()?);
    browser
        .route("/wiki", PageKind::Quiz, QUIZ_HTML)
        .route(
            "/stats",
            PageKind::Stats,
            r#"<body><a href="/" class="clear-score">Clear</a><table><tbody></tbody></table></body>"#,
        );

    let quiz = browser.open(QUIZ_URL)?;
    quiz.select_option("#A select", "A")?;
    quiz.select_option("#B select", "B")?;
    quiz.click("#submit")?;

    let stats = browser
        .follow_navigation()?
        .ok_or_else(|| Error::Navigation("save did not navigate".into()))?;
    assert_eq!(stats.url(), "http://localhost:4567/stats");
    assert_eq!(stats.query_count("tbody tr")?, 1);
    stats.assert_text(
        "tbody tr td a",
        "https://en.wikipedia.org/wiki/Rust_(programming_language)",
    )?;
    stats.assert_text(
        "tbody tr",
        "https://en.wikipedia.org/wiki/Rust_(programming_language)1.003/7/2026, 7:05:09 PM",
    )?;
    assert_eq!(
        browser.storage().get_item("stats").map(|raw| raw.contains("\"1.00\"")),
        Some(true)
    );
    assert_eq!(browser.visited().len(), 2);
    Ok(())
}
