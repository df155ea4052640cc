//! Debate state machine integration test: drives full sessions through
//! `transition` with canned model answers (no dispatching, no LLM calls).
//!
//! Covers: round recording ↔ baseline consensus ↔ synthesis ↔ provenance
//! running together in a single pass.

use std::time::Duration;

use coordination::consensus::{ConfidenceTier, ConsensusScorer};
use coordination::debate::prompts;
use coordination::debate::{
    transition, DebatePhase, DebateSession, Provenance, RoundInput, RoundKind,
};
use coordination::errors::{FailureKind, InvocationFailure};
use coordination::findings::{FindingCategory, Severity};
use coordination::invocation::InvocationResult;

const SQLI: &str = "[critical][security] SQL injection in query builder";
const MUTEX: &str = "[warning][performance] global mutex held across await points";
const NAMING: &str = "[info][quality] helper names could be clearer";

/// Helper: a successful answer from `id`.
fn answer(id: &str, text: &str) -> InvocationResult {
    InvocationResult::completed(id, text, Duration::from_millis(120), 0)
}

/// Helper: a failed answer from `id`.
fn failed(id: &str, kind: FailureKind) -> InvocationResult {
    InvocationResult::failed(
        InvocationFailure::new(kind, id, "mock failure"),
        Duration::from_millis(50),
        0,
    )
}

fn panel() -> DebateSession {
    DebateSession::new(
        "Review the data access layer",
        vec!["alpha".into(), "beta".into(), "gamma".into()],
    )
}

/// Helper: run all three rounds and return the sealed session.
fn run_debate(
    independent: Vec<InvocationResult>,
    cross: Vec<InvocationResult>,
) -> DebateSession {
    let scorer = ConsensusScorer::default();
    let mut session = panel();
    transition(&mut session, RoundInput::new(independent), &scorer).unwrap();
    transition(&mut session, RoundInput::new(cross), &scorer).unwrap();
    transition(&mut session, RoundInput::new(vec![]), &scorer).unwrap();
    session
}

fn provenance_of(session: &DebateSession, needle: &str) -> Provenance {
    session
        .provenance
        .iter()
        .find(|p| p.description.contains(needle))
        .unwrap_or_else(|| panic!("no provenance entry for {needle:?}"))
        .status
}

// ── Full lifecycle (happy path) ────────────────────────────────────

#[test]
fn test_debate_full_lifecycle() {
    let scorer = ConsensusScorer::default();
    let mut session = panel();
    assert_eq!(session.phase, DebatePhase::Independent);

    let next = transition(
        &mut session,
        RoundInput::new(vec![
            answer("alpha", SQLI),
            answer("beta", SQLI),
            answer("gamma", NAMING),
        ]),
        &scorer,
    )
    .unwrap();
    assert_eq!(next, DebatePhase::CrossExamination);

    let baseline = session
        .round(RoundKind::Independent)
        .and_then(|r| r.round_consensus.as_ref())
        .unwrap();
    assert_eq!(baseline.confidence_tier, ConfidenceTier::Medium);
    assert!(!baseline.degraded);

    // gamma is persuaded and drops its naming nit.
    let next = transition(
        &mut session,
        RoundInput::new(vec![
            answer("alpha", SQLI),
            answer("beta", SQLI),
            answer("gamma", SQLI),
        ]),
        &scorer,
    )
    .unwrap();
    assert_eq!(next, DebatePhase::Synthesis);
    assert!(session
        .round(RoundKind::CrossExamination)
        .unwrap()
        .round_consensus
        .is_none());

    let next = transition(&mut session, RoundInput::new(vec![]), &scorer).unwrap();
    assert_eq!(next, DebatePhase::Sealed);
    assert!(session.is_sealed());
    assert!(session.sealed_at.is_some());
    assert_eq!(session.rounds.len(), 3);
    assert_eq!(session.transitions.len(), 3);

    let indices: Vec<u32> = session.rounds.iter().map(|r| r.index).collect();
    assert_eq!(indices, [1, 2, 3]);

    let report = session.final_consensus.as_ref().unwrap();
    assert_eq!(report.confidence_tier, ConfidenceTier::High);
    assert_eq!(report.agreed_findings.len(), 1);
    assert_eq!(report.agreed_findings[0].support(), 3);
    assert_eq!(report.agreed_findings[0].severity, Severity::Critical);

    assert_eq!(provenance_of(&session, "SQL injection"), Provenance::Survived);
    assert_eq!(provenance_of(&session, "helper names"), Provenance::Discarded);
    assert!(session.status_line().contains("confidence=high"));
}

// ── Degradation ────────────────────────────────────────────────────

#[test]
fn test_empty_cross_examination_degrades_synthesis() {
    let session = run_debate(
        vec![
            answer("alpha", SQLI),
            answer("beta", SQLI),
            answer("gamma", SQLI),
        ],
        vec![
            failed("alpha", FailureKind::NetworkError),
            failed("beta", FailureKind::RateLimited),
            failed("gamma", FailureKind::ProcessTimeout),
        ],
    );

    assert!(session.is_sealed());
    let cross = session.round(RoundKind::CrossExamination).unwrap();
    assert!(cross.degraded);
    assert_eq!(cross.success_count(), 0);

    // Independent answers stand in for the missing revisions.
    let report = session.final_consensus.as_ref().unwrap();
    assert!(report.degraded);
    assert_eq!(report.responding_models(), 3);
    assert!(report.confidence_tier <= ConfidenceTier::Medium);
    assert!(report.clusters().all(|c| c.tier <= ConfidenceTier::Medium));
}

#[test]
fn test_missing_participants_are_recorded_as_cancelled() {
    let session = run_debate(
        vec![answer("alpha", SQLI), answer("beta", SQLI)],
        vec![answer("alpha", SQLI), answer("beta", SQLI)],
    );

    for kind in [RoundKind::Independent, RoundKind::CrossExamination] {
        let round = session.round(kind).unwrap();
        assert_eq!(round.per_model_outputs.len(), 3);
        let gamma = round.per_model_outputs["gamma"].failure().unwrap();
        assert_eq!(gamma.kind, FailureKind::Cancelled);
    }

    // Two of three still answered, so the panel is not degraded.
    let report = session.final_consensus.as_ref().unwrap();
    assert!(!report.degraded);
    assert_eq!(report.agreed_findings[0].support(), 2);
}

#[test]
fn test_no_independent_data_seals_with_no_data() {
    let session = run_debate(
        vec![
            failed("alpha", FailureKind::AuthError),
            failed("beta", FailureKind::AuthError),
            failed("gamma", FailureKind::ProcessSpawnError),
        ],
        vec![],
    );

    assert!(session.is_sealed());
    assert!(!session.has_independent_data());
    let report = session.final_consensus.as_ref().unwrap();
    assert!(report.is_no_data());
    assert_eq!(report.confidence_tier, ConfidenceTier::Low);
    assert!(session.provenance.is_empty());
}

// ── Provenance ─────────────────────────────────────────────────────

#[test]
fn test_severity_change_is_revised() {
    let soft = "[warning][security] SQL injection in query builder";
    let session = run_debate(
        vec![answer("alpha", soft), answer("beta", soft), answer("gamma", soft)],
        vec![answer("alpha", SQLI), answer("beta", SQLI), answer("gamma", SQLI)],
    );

    assert_eq!(provenance_of(&session, "SQL injection"), Provenance::Revised);
    let entry = &session.provenance[0];
    assert_eq!(entry.severity, Severity::Critical);
    assert_eq!(entry.original_support, Some(3));
    assert_eq!(entry.final_support, Some(3));
}

#[test]
fn test_new_concern_during_cross_examination_is_introduced() {
    let both = format!("{SQLI}\n{MUTEX}");
    let session = run_debate(
        vec![answer("alpha", SQLI), answer("beta", SQLI), answer("gamma", SQLI)],
        vec![
            answer("alpha", &both),
            answer("beta", &both),
            answer("gamma", SQLI),
        ],
    );

    assert_eq!(provenance_of(&session, "SQL injection"), Provenance::Survived);
    assert_eq!(provenance_of(&session, "global mutex"), Provenance::Introduced);

    let mutex = session
        .final_consensus
        .as_ref()
        .unwrap()
        .clusters()
        .find(|c| c.category == FindingCategory::Performance)
        .unwrap();
    assert_eq!(mutex.support(), 2);
    assert_eq!(mutex.tier, ConfidenceTier::Medium);
}

// ── Guards ─────────────────────────────────────────────────────────

#[test]
fn test_sealed_session_rejects_further_rounds() {
    let mut session = run_debate(
        vec![answer("alpha", SQLI), answer("beta", SQLI), answer("gamma", SQLI)],
        vec![answer("alpha", SQLI), answer("beta", SQLI), answer("gamma", SQLI)],
    );
    let before = session.final_consensus.clone();

    let err = transition(
        &mut session,
        RoundInput::new(vec![answer("alpha", NAMING)]),
        &ConsensusScorer::default(),
    )
    .unwrap_err();

    assert_eq!(err.from, DebatePhase::Sealed);
    assert_eq!(session.rounds.len(), 3);
    assert_eq!(session.final_consensus, before);
}

#[test]
fn test_timed_out_round_is_flagged() {
    let scorer = ConsensusScorer::default();
    let mut session = panel();
    transition(
        &mut session,
        RoundInput::new(vec![answer("alpha", SQLI), answer("beta", SQLI)]).timed_out(true),
        &scorer,
    )
    .unwrap();

    let round = session.round(RoundKind::Independent).unwrap();
    assert!(round.timed_out);
    assert_eq!(round.success_count(), 2);
}

#[test]
fn test_synthesis_narrative_is_attached() {
    let scorer = ConsensusScorer::default();
    let mut session = panel();
    let all = || vec![answer("alpha", SQLI), answer("beta", SQLI), answer("gamma", SQLI)];
    transition(&mut session, RoundInput::new(all()), &scorer).unwrap();
    transition(&mut session, RoundInput::new(all()), &scorer).unwrap();
    transition(
        &mut session,
        RoundInput::new(vec![answer("alpha", "The panel agrees the query builder is unsafe.")])
            .with_narrative(Some("The panel agrees the query builder is unsafe.".into())),
        &scorer,
    )
    .unwrap();

    assert_eq!(
        session.narrative.as_deref(),
        Some("The panel agrees the query builder is unsafe.")
    );
    let synthesis = session.round(RoundKind::Synthesis).unwrap();
    assert_eq!(synthesis.per_model_outputs.len(), 1);
}

// ── Prompts ────────────────────────────────────────────────────────

#[test]
fn test_cross_examination_prompts_carry_peer_answers() {
    let scorer = ConsensusScorer::default();
    let mut session = panel();
    transition(
        &mut session,
        RoundInput::new(vec![
            answer("alpha", SQLI),
            answer("beta", MUTEX),
            failed("gamma", FailureKind::NetworkError),
        ]),
        &scorer,
    )
    .unwrap();

    let requests = prompts::cross_examination_requests(&session);
    let alpha = requests.iter().find(|(id, _, _)| id == "alpha").unwrap();
    let labels: Vec<&str> = alpha.2.iter().map(|b| b.label.as_str()).collect();
    assert!(labels.contains(&"your previous answer"));
    assert!(labels.contains(&"answer from beta"));
    // gamma failed, so nobody sees an answer from it.
    assert!(!labels.contains(&"answer from gamma"));
}
