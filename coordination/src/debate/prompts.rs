//! Prompt assembly for debate rounds.
//!
//! Only the framing lives here; the topic text and any shared context come
//! from the caller untouched.

use crate::consensus::ConsensusReport;
use crate::invocation::ContextBlock;

use super::state::{DebateSession, RoundKind};

const CROSS_EXAMINATION_INSTRUCTIONS: &str = "\
You previously answered the question below. The answers of the other \
participants are attached. Critique them and your own answer. Keep the \
findings you still stand behind, revise the ones you now see differently, \
and drop any you no longer support. Report findings one per line as \
`[severity][category] description (file:line)`.";

const SYNTHESIS_INSTRUCTIONS: &str = "\
Several reviewers debated the question below over two rounds. Their final \
positions and the computed consensus are attached. Write a short synthesis \
that states which findings survived, which were revised, and which were \
discarded, and the overall confidence.";

/// Prompt for the independent round: the topic alone.
pub fn independent_prompt(topic: &str) -> String {
    topic.to_string()
}

/// Prompt and context for one participant's cross-examination.
///
/// `own` is the participant's independent answer, if it produced one.
/// `peers` are the other participants' answers in a stable order.
pub fn cross_examination(
    topic: &str,
    own: Option<&str>,
    peers: &[(&str, &str)],
) -> (String, Vec<ContextBlock>) {
    let prompt = format!("{CROSS_EXAMINATION_INSTRUCTIONS}\n\nQuestion:\n{topic}");
    let mut context = Vec::with_capacity(peers.len() + 1);
    context.push(ContextBlock::new(
        "your previous answer",
        own.unwrap_or("(you did not answer in the previous round)"),
    ));
    for (peer, text) in peers {
        context.push(ContextBlock::new(format!("answer from {peer}"), *text));
    }
    (prompt, context)
}

/// Per-participant cross-examination inputs built from the session's
/// independent round: `(model_id, prompt, context)` in participant order.
pub fn cross_examination_requests(
    session: &DebateSession,
) -> Vec<(String, String, Vec<ContextBlock>)> {
    let Some(round) = session.round(RoundKind::Independent) else {
        return Vec::new();
    };
    let answers: Vec<(&str, &str)> = round.successful_outputs().collect();
    session
        .participants
        .iter()
        .map(|id| {
            let own = answers.iter().find(|(m, _)| *m == id.as_str()).map(|(_, t)| *t);
            let peers: Vec<(&str, &str)> = answers
                .iter()
                .filter(|(m, _)| *m != id.as_str())
                .copied()
                .collect();
            let (prompt, context) = cross_examination(&session.topic, own, &peers);
            (id.clone(), prompt, context)
        })
        .collect()
}

/// Prompt and context for the optional narrative synthesizer.
pub fn synthesis(session: &DebateSession, consensus: &ConsensusReport) -> (String, Vec<ContextBlock>) {
    let prompt = format!("{SYNTHESIS_INSTRUCTIONS}\n\nQuestion:\n{}", session.topic);
    let mut context = Vec::new();
    let latest = session
        .round(RoundKind::CrossExamination)
        .filter(|r| r.success_count() > 0)
        .or_else(|| session.round(RoundKind::Independent));
    if let Some(round) = latest {
        for (id, text) in round.successful_outputs() {
            context.push(ContextBlock::new(format!("final position of {id}"), text));
        }
    }
    context.push(ContextBlock::new("computed consensus", consensus.summary()));
    (prompt, context)
}
