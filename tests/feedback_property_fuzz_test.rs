use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mock_feedback::{MockFeedback, QueueMode, SpeechProperties, TtsSink};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseResult};

const FEEDBACK_PROPTEST_REGRESSION_FILE: &str =
    "tests/proptest-regressions/feedback_property_fuzz_test.txt";
const DEFAULT_FEEDBACK_PROPTEST_CASES: u32 = 128;

fn feedback_proptest_cases() -> u32 {
    std::env::var("MOCK_FEEDBACK_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_FEEDBACK_PROPTEST_CASES)
}

fn utterance_strategy() -> BoxedStrategy<String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("c".to_string()),
        Just("link".to_string()),
        Just("button".to_string()),
    ]
    .boxed()
}

/// Emitted utterances plus a mask picking which of them are expected.
fn emission_plan_strategy() -> BoxedStrategy<(Vec<String>, Vec<bool>)> {
    vec(utterance_strategy(), 1..=24)
        .prop_flat_map(|utterances| {
            let len = utterances.len();
            (Just(utterances), vec(any::<bool>(), len))
        })
        .boxed()
}

struct Run {
    feedback: MockFeedback,
    finished: Rc<Cell<usize>>,
    consumed: Rc<RefCell<Vec<usize>>>,
}

fn run_plan(utterances: &[String], mask: &[bool], replay_first: bool) -> Run {
    let finished = Rc::new(Cell::new(0));
    let counter = Rc::clone(&finished);
    let feedback = MockFeedback::with_finished(move || counter.set(counter.get() + 1));
    feedback.set_log_stderr(false);
    let consumed = Rc::new(RefCell::new(Vec::new()));

    let tts = feedback
        .install_speech_sink()
        .expect("install before replay");
    let expected = utterances
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(text, _)| text.as_str());
    feedback
        .expect_speech_all(expected)
        .expect("declare before replay");

    if replay_first {
        feedback.replay().expect("first replay");
    }
    for (idx, text) in utterances.iter().enumerate() {
        let consumed = Rc::clone(&consumed);
        tts.speak(
            text,
            QueueMode::Queue,
            SpeechProperties::default().on_start(move || consumed.borrow_mut().push(idx)),
        );
    }
    if !replay_first {
        feedback.replay().expect("first replay");
    }

    Run {
        feedback,
        finished,
        consumed,
    }
}

fn assert_subsequence_always_drains(utterances: &[String], mask: &[bool]) -> TestCaseResult {
    for replay_first in [true, false] {
        let run = run_plan(utterances, mask, replay_first);

        prop_assert_eq!(
            run.finished.get(),
            1,
            "queue did not drain (replay_first={}): pending={:?}",
            replay_first,
            run.feedback.pending_expectations()
        );

        // Consumption is always a prefix of the emission order.
        let consumed = run.consumed.borrow();
        let prefix = (0..consumed.len()).collect::<Vec<_>>();
        prop_assert_eq!(&*consumed, &prefix);

        let leftover = run.feedback.pending_utterances();
        prop_assert_eq!(consumed.len() + leftover.len(), utterances.len());
        prop_assert_eq!(&leftover[..], &utterances[consumed.len()..]);
    }
    Ok(())
}

fn assert_buffering_is_replay_independent(utterances: &[String], mask: &[bool]) -> TestCaseResult {
    let live = run_plan(utterances, mask, true);
    let buffered = run_plan(utterances, mask, false);

    prop_assert_eq!(
        live.feedback.pending_utterances(),
        buffered.feedback.pending_utterances()
    );
    prop_assert_eq!(&*live.consumed.borrow(), &*buffered.consumed.borrow());
    prop_assert_eq!(live.finished.get(), buffered.finished.get());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: feedback_proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(FEEDBACK_PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn expected_subsequence_of_output_always_drains((utterances, mask) in emission_plan_strategy()) {
        assert_subsequence_always_drains(&utterances, &mask)?;
    }

    #[test]
    fn matching_does_not_depend_on_when_replay_starts((utterances, mask) in emission_plan_strategy()) {
        assert_buffering_is_replay_independent(&utterances, &mask)?;
    }
}
