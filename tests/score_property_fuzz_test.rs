use cloze_stats::{
    Error, Grader, LocalStorage, Page, QuizConfig, ScoreRepository, format_score,
};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseError, TestCaseResult};

const SCORE_PROPTEST_REGRESSION_FILE: &str =
    "tests/proptest-regressions/score_property_fuzz_test.txt";
const DEFAULT_SCORE_PROPTEST_CASES: u32 = 128;
const SLOT_COUNT: usize = 5;
const SLOT_IDS: [&str; SLOT_COUNT] = ["alpha", "beta", "gamma", "delta", "epsilon"];

#[derive(Clone, Debug)]
enum QuizAction {
    Pick { slot: usize, correct: bool },
    ForceChange { slot: usize },
}

fn score_proptest_cases() -> u32 {
    std::env::var("CLOZE_STATS_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SCORE_PROPTEST_CASES)
}

fn quiz_html() -> String {
    let slots: String = SLOT_IDS
        .iter()
        .map(|id| {
            format!(
                r#"<span id="{id}"><select><option value="">-</option><option>{id}</option><option>nope</option></select></span> "#
            )
        })
        .collect();
    format!(r#"<body><div id="content"><p>{slots}</p></div></body>"#)
}

fn quiz_action_strategy() -> BoxedStrategy<QuizAction> {
    prop_oneof![
        4 => (0..SLOT_COUNT, any::<bool>())
            .prop_map(|(slot, correct)| QuizAction::Pick { slot, correct }),
        1 => (0..SLOT_COUNT).prop_map(|slot| QuizAction::ForceChange { slot }),
    ]
    .boxed()
}

fn fail(err: Error) -> TestCaseError {
    TestCaseError::fail(format!("{err:?}"))
}

fn assert_grading_sequence(actions: &[QuizAction]) -> TestCaseResult {
    let storage = LocalStorage::new();
    let mut page = Page::from_html_with_url_and_local_storage(
        "http://localhost:4567/wiki?url=https://en.wikipedia.org/wiki/Cloze_test",
        &quiz_html(),
        storage.clone(),
    )
    .map_err(fail)?;
    page.add_script(Grader::new(QuizConfig::default())).map_err(fail)?;

    // First effective pick per slot decides its verdict.
    let mut expected: [Option<bool>; SLOT_COUNT] = [None; SLOT_COUNT];
    for action in actions {
        match action {
            QuizAction::Pick { slot, correct } => {
                let id = SLOT_IDS[*slot];
                let value = if *correct { id } else { "nope" };
                page.select_option(&format!("#{id} select"), value)
                    .map_err(fail)?;
                if expected[*slot].is_none() {
                    expected[*slot] = Some(*correct);
                }
            }
            QuizAction::ForceChange { slot } => {
                page.dispatch(&format!("#{} select", SLOT_IDS[*slot]), "change")
                    .map_err(fail)?;
                // A forced change on an untouched slot grades its current
                // empty choice.
                if expected[*slot].is_none() {
                    expected[*slot] = Some(false);
                }
            }
        }
    }

    let answered = expected.iter().filter(|slot| slot.is_some()).count();
    let correct = expected.iter().filter(|slot| **slot == Some(true)).count();

    prop_assert_eq!(page.query_count(".answer").map_err(fail)?, answered);
    prop_assert_eq!(page.query_count(".correct").map_err(fail)?, correct);
    prop_assert_eq!(page.query_count(".wrong").map_err(fail)?, answered - correct);
    prop_assert_eq!(page.query_count("select[disabled]").map_err(fail)?, answered);
    for (slot, state) in expected.iter().enumerate() {
        let selector = format!("#{}", SLOT_IDS[slot]);
        let is_correct = page
            .assert_class(&selector, "correct", true)
            .is_ok();
        let is_wrong = page.assert_class(&selector, "wrong", true).is_ok();
        prop_assert!(!(is_correct && is_wrong), "slot {selector} has both verdicts");
        prop_assert_eq!(is_correct, *state == Some(true));
    }

    page.click("#submit").map_err(fail)?;
    let history = ScoreRepository::new(storage).load();
    prop_assert_eq!(history.len(), 1);
    prop_assert_eq!(&history[0].score, &format_score(correct, answered));
    prop_assert_eq!(&history[0].url, "https://en.wikipedia.org/wiki/Cloze_test");
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: score_proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(SCORE_PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn each_slot_is_graded_exactly_once(actions in vec(quiz_action_strategy(), 0..=24)) {
        assert_grading_sequence(&actions)?;
    }

    #[test]
    fn formatted_score_has_two_decimals_and_stays_in_range(
        answered in 0usize..500,
        correct_ratio in 0.0f64..=1.0,
    ) {
        let correct = (answered as f64 * correct_ratio).floor() as usize;
        let score = format_score(correct, answered);
        let (whole, fraction) = score
            .split_once('.')
            .ok_or_else(|| TestCaseError::fail(format!("no decimal point in {score}")))?;
        prop_assert_eq!(fraction.len(), 2);
        prop_assert!(whole == "0" || score == "1.00", "score out of range: {}", score);
        // `{:.70}` prints the exact binary expansion of the ratio; toFixed
        // rounds up exactly when its third decimal is 5 or more.
        let ratio = correct as f64 / answered.max(1) as f64;
        let expansion = format!("{ratio:.70}");
        let (_, digits) = expansion
            .split_once('.')
            .ok_or_else(|| TestCaseError::fail(format!("no decimal point in {expansion}")))?;
        let hundredths: u64 = format!("{whole}{fraction}")
            .parse()
            .map_err(|err| TestCaseError::fail(format!("{score}: {err}")))?;
        let truncated: u64 = format!("{}{}", &expansion[..1], &digits[..2])
            .parse()
            .map_err(|err| TestCaseError::fail(format!("{expansion}: {err}")))?;
        let rounds_up = digits.as_bytes()[2] >= b'5';
        prop_assert_eq!(
            hundredths,
            truncated + u64::from(rounds_up),
            "{} of {} gave {} (exact ratio {})",
            correct,
            answered,
            score,
            expansion
        );
    }
}
