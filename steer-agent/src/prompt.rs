//! Prompt assembly for the planning turn.

use crate::driver::PageSnapshot;
use crate::patterns::SuccessPattern;
use crate::session::Session;

/// System prompt pinning the action wire contract. The extractor tolerates
/// deviations, but asking for strict JSON keeps the fast path fast.
pub const SYSTEM_PROMPT: &str = r##"You are a browser automation agent. You control a real browser by issuing ONE action at a time as a JSON object.

Available actions:
- {"type":"navigate","value":"https://..."}
- {"type":"click","element":"#css-selector","selectorType":"css"}
- {"type":"input","element":"#css-selector","value":"text to type"}
- {"type":"wait","maxWait":3000}
- {"type":"scroll","direction":"down"}
- {"type":"notes","operation":"add","note":"something worth remembering"}
- {"type":"sendHumanMessage","question":"what you need from the operator"}

Rules:
1. Return ONLY a single JSON object per response. No markdown, no explanation.
2. selectorType may be "css", "xpath", or "text"; css is the default.
3. Prefer selectors taken from the element inventory you are shown.
4. Use input to fill fields; submit with a click on the submit control.
5. If you are blocked, repeat-failing, or need credentials, use sendHumanMessage.
6. Keep actions minimal; one careful step at a time."##;

/// Assemble the user prompt for one planning turn. Drains the session's
/// queued feedback.
pub fn build_turn_prompt(
    session: &mut Session,
    snapshot: &PageSnapshot,
    patterns: &[SuccessPattern],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("Goal: {}\n", session.goal));
    prompt.push_str(&format!(
        "Progress: {:.0}% of known milestones reached.\n\n",
        session.progress_percent()
    ));

    prompt.push_str("Current page:\n");
    prompt.push_str(&snapshot.render());
    prompt.push('\n');

    let feedback = session.take_feedback();
    if !feedback.is_empty() {
        prompt.push_str("Feedback from the last step:\n");
        prompt.push_str(&feedback);
        prompt.push_str("\n\n");
    }

    let recent = session.recent_history(10);
    if !recent.is_empty() {
        prompt.push_str("Recent history:\n");
        for line in recent {
            prompt.push_str(&format!("- {line}\n"));
        }
        prompt.push('\n');
    }

    if !patterns.is_empty() {
        prompt.push_str("Selectors that worked on this site before:\n");
        for p in patterns.iter().take(5) {
            prompt.push_str(&format!(
                "- {} on {} ({}x)\n",
                p.action_type, p.element, p.success_count
            ));
        }
        prompt.push('\n');
    }

    if !session.notes.is_empty() {
        prompt.push_str("Your notes so far:\n");
        for note in &session.notes {
            prompt.push_str(&format!("- {note}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str("What is your next action? Respond with one JSON object.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_goal_feedback_and_drains_it() {
        let mut session = Session::new("login to my account");
        session.push_feedback("Milestone achieved: reach_login_page");

        let snapshot = PageSnapshot {
            url: "https://example.com/login".into(),
            title: "Sign in".into(),
            ..Default::default()
        };

        let prompt = build_turn_prompt(&mut session, &snapshot, &[]);
        assert!(prompt.contains("Goal: login to my account"));
        assert!(prompt.contains("Milestone achieved"));
        assert!(prompt.contains("https://example.com/login"));

        // Feedback was drained; a second prompt no longer repeats it.
        let prompt2 = build_turn_prompt(&mut session, &snapshot, &[]);
        assert!(!prompt2.contains("Milestone achieved"));
    }
}
