use super::*;

#[test]
fn stalled_queue_logs_pending_state_after_delay() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    let sinks = feedback.install()?;
    feedback.expect_speech("a")?.replay()?;
    assert_eq!(feedback.pending_diagnostic(), Some(DEFAULT_DIAGNOSTIC_DELAY_MS));

    speak(&sinks.tts, "b");
    speak(&sinks.tts, "c");
    sinks
        .braille
        .write(NavBraille::new("row").with_cursor(2, 5));

    feedback.advance_time(1_999)?;
    assert!(feedback.take_logs().is_empty());

    feedback.advance_time(1)?;
    assert_eq!(
        feedback.take_logs(),
        vec![
            "Still waiting for Speak 'a'",
            "Pending speech utterances:",
            "  'b'",
            "  'c'",
            "Pending braille:",
            "  'row' start_index=2 end_index=5",
        ]
    );
    assert_eq!(feedback.pending_diagnostic(), None);
    Ok(())
}

#[test]
fn empty_buffers_are_omitted_from_diagnostics() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    feedback
        .expect_braille_with("x", BrailleProperties::new().with("end_index", 1))?
        .replay()?;

    feedback.advance_time(DEFAULT_DIAGNOSTIC_DELAY_MS)?;
    assert_eq!(
        feedback.take_logs(),
        vec!["Still waiting for Braille 'x' {\"end_index\":1}"]
    );
    Ok(())
}

#[test]
fn progress_cancels_and_rearms_the_diagnostic_timer() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    let tts = feedback.install_speech_sink()?;
    feedback.expect_speech("a")?.expect_speech("b")?.replay()?;
    assert_eq!(feedback.pending_diagnostic(), Some(2_000));

    feedback.advance_time(1_500)?;
    speak(&tts, "a");
    assert_eq!(feedback.pending_diagnostic(), Some(3_500));

    feedback.advance_time_to(2_000)?;
    assert!(feedback.take_logs().is_empty());

    speak(&tts, "b");
    assert_eq!(feedback.pending_diagnostic(), None);
    feedback.advance_time(10_000)?;
    assert!(feedback.take_logs().is_empty());
    Ok(())
}

#[test]
fn unmatched_output_does_not_postpone_the_diagnostic() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    let tts = feedback.install_speech_sink()?;
    feedback.expect_speech("a")?.replay()?;

    feedback.advance_time(1_000)?;
    speak(&tts, "noise");
    assert_eq!(feedback.pending_diagnostic(), Some(2_000));
    Ok(())
}

#[test]
fn fired_diagnostic_is_rearmed_by_the_next_trigger() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    let tts = feedback.install_speech_sink()?;
    feedback.expect_speech("a")?.replay()?;

    feedback.advance_time(2_000)?;
    assert_eq!(feedback.take_logs().len(), 1);
    assert_eq!(feedback.pending_diagnostic(), None);

    feedback.advance_time(500)?;
    speak(&tts, "b");
    assert_eq!(feedback.pending_diagnostic(), Some(4_500));
    assert_eq!(feedback.run_due_timers(), 0);
    Ok(())
}

#[test]
fn nothing_is_armed_before_replay() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    let tts = feedback.install_speech_sink()?;
    feedback.expect_speech("a")?;
    speak(&tts, "b");

    assert_eq!(feedback.pending_diagnostic(), None);
    feedback.advance_time(60_000)?;
    assert!(feedback.take_logs().is_empty());
    Ok(())
}

#[test]
fn diagnostic_delay_is_configurable() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    feedback.set_diagnostic_delay_ms(250)?;
    feedback.expect_speech("a")?.replay()?;
    assert_eq!(feedback.pending_diagnostic(), Some(250));

    match feedback.set_diagnostic_delay_ms(-1) {
        Err(Error::InvalidConfig(message)) => {
            assert!(message.contains("non-negative"), "unexpected: {message}")
        }
        other => panic!("expected invalid config, got: {other:?}"),
    }
    Ok(())
}

#[test]
fn clock_rejects_moving_backwards() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    feedback.advance_time(100)?;
    assert_eq!(feedback.now_ms(), 100);

    assert!(matches!(
        feedback.advance_time(-1),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        feedback.advance_time_to(99),
        Err(Error::InvalidConfig(_))
    ));
    feedback.advance_time(i64::MAX)?;
    assert_eq!(feedback.now_ms(), i64::MAX);
    Ok(())
}

#[test]
fn trace_records_engine_events() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    feedback.enable_trace(true);
    let sinks = feedback.install()?;
    feedback
        .expect_speech("hi")?
        .call(|| {})?
        .expect_braille("row")?;
    feedback.replay()?;
    speak(&sinks.tts, "hi");
    sinks.braille.write(NavBraille::new("row"));

    let logs = feedback.take_logs();
    assert_eq!(
        logs,
        vec![
            "[feedback] replay pending_expectations=3 utterances=0 braille=0",
            "[timer] schedule diagnostic due_at=2000 delay_ms=2000",
            "[feedback] buffered speech 'hi'",
            "[timer] cancel diagnostic due_at=2000",
            "[feedback] matched Speak 'hi' consumed=1",
            "[feedback] callback",
            "[timer] schedule diagnostic due_at=2000 delay_ms=2000",
            "[feedback] buffered braille 'row' start_index=-1 end_index=-1",
            "[timer] cancel diagnostic due_at=2000",
            "[feedback] matched Braille 'row' {} consumed=1",
        ]
    );
    Ok(())
}

#[test]
fn trace_is_silent_unless_enabled() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    let tts = feedback.install_speech_sink()?;
    feedback.expect_speech("hi")?.replay()?;
    speak(&tts, "hi");
    feedback.advance_time(5)?;
    assert!(feedback.take_logs().is_empty());
    Ok(())
}

#[test]
fn log_limit_keeps_the_newest_lines() -> Result<()> {
    let feedback = quiet(MockFeedback::new());
    let tts = feedback.install_speech_sink()?;
    feedback.expect_speech("never")?.replay()?;
    for text in ["a", "b", "c"] {
        speak(&tts, text);
    }

    feedback.set_log_limit(2)?;
    feedback.advance_time(2_000)?;
    assert_eq!(feedback.take_logs(), vec!["  'b'", "  'c'"]);

    assert!(matches!(
        feedback.set_log_limit(0),
        Err(Error::InvalidConfig(_))
    ));
    Ok(())
}
