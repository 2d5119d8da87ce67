//! Goal classification and progress measurement.
//!
//! At session start the goal string is classified into an ordered milestone
//! checklist. After every page refresh we (a) try to recognize the next
//! unmet milestone from the snapshot and the last action, and (b) diff the
//! snapshot against the previous one into plain-language feedback
//! regardless of milestones.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::driver::PageSnapshot;

/// A named, goal-specific checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    pub description: String,
    pub recognized: bool,
}

impl Milestone {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            recognized: false,
        }
    }
}

/// Classify a goal into an ordered milestone checklist.
///
/// Keyword-matched flows first; anything unrecognized falls back to the
/// generic navigation/interaction/completion checklist.
pub fn classify_goal(goal: &str) -> Vec<Milestone> {
    let lower = goal.to_lowercase();

    if ["login", "log in", "sign in", "signin"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return vec![
            Milestone::new("reach_login_page", "Reach the login page"),
            Milestone::new("enter_credentials", "Enter the account credentials"),
            Milestone::new("submit_login", "Submit the login form"),
            Milestone::new("login_successful", "Confirm the login succeeded"),
        ];
    }

    if ["search", "find", "look up", "look for"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return vec![
            Milestone::new("enter_search_query", "Enter the search query"),
            Milestone::new("submit_search", "Submit the search"),
            Milestone::new("view_search_results", "View the search results"),
        ];
    }

    if ["buy", "purchase", "order", "checkout", "add to cart"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return vec![
            Milestone::new("find_product", "Locate the product page"),
            Milestone::new("add_to_cart", "Add the product to the cart"),
            Milestone::new("begin_checkout", "Start the checkout flow"),
            Milestone::new("complete_purchase", "Complete the purchase"),
        ];
    }

    if ["form", "fill", "register", "sign up", "signup", "apply"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return vec![
            Milestone::new("reach_form", "Reach the form"),
            Milestone::new("fill_form_fields", "Fill in the form fields"),
            Milestone::new("submit_form", "Submit the form"),
            Milestone::new("form_submitted", "Confirm the form was accepted"),
        ];
    }

    vec![
        Milestone::new("initial_navigation", "Navigate to a relevant page"),
        Milestone::new("page_interaction", "Interact with the page"),
        Milestone::new("goal_completion", "Reach a completion state"),
    ]
}

/// Try to recognize the next unmet milestone, in order. Returns feedback for
/// the planner when one is recognized.
///
/// Predicates are URL/title substring checks gated on earlier milestones
/// (implicitly, since only the next unmet one is eligible) and/or the last
/// action type.
pub fn recognize_next(
    milestones: &mut [Milestone],
    snapshot: &PageSnapshot,
    last_action: Option<&Action>,
) -> Option<String> {
    let next = milestones.iter_mut().find(|m| !m.recognized)?;
    if !milestone_met(&next.name, snapshot, last_action) {
        return None;
    }
    next.recognized = true;
    tracing::info!(target: "agent.progress", milestone = %next.name, "milestone recognized");
    Some(format!(
        "Milestone achieved: {} ({})",
        next.name, next.description
    ))
}

fn milestone_met(name: &str, snapshot: &PageSnapshot, last_action: Option<&Action>) -> bool {
    let url = snapshot.url.to_lowercase();
    let title = snapshot.title.to_lowercase();
    let page_mentions =
        |needles: &[&str]| needles.iter().any(|n| url.contains(n) || title.contains(n));
    let last_is_input = matches!(last_action, Some(Action::Input { .. }));
    let last_is_click = matches!(last_action, Some(Action::Click { .. }));

    match name {
        // login flow
        "reach_login_page" => page_mentions(&["login", "signin", "sign-in", "auth"]),
        "enter_credentials" => last_is_input,
        "submit_login" => last_is_click,
        "login_successful" => !page_mentions(&["login", "signin", "sign-in"]),

        // search flow
        "enter_search_query" => last_is_input,
        "submit_search" => last_is_click || page_mentions(&["q=", "search"]),
        "view_search_results" => page_mentions(&["q=", "search", "results"]),

        // purchase flow
        "find_product" => page_mentions(&["product", "item", "/p/"]) || last_is_click,
        "add_to_cart" => page_mentions(&["cart", "basket"]) || last_is_click,
        "begin_checkout" => page_mentions(&["checkout", "payment"]),
        "complete_purchase" => page_mentions(&["confirm", "thank", "order"]),

        // form flow
        "reach_form" => {
            page_mentions(&["form", "register", "signup", "sign-up", "apply"])
                || snapshot.inputs.len() >= 3
        }
        "fill_form_fields" => last_is_input,
        "submit_form" => last_is_click,
        "form_submitted" => page_mentions(&["success", "thank", "submitted", "complete"]),

        // generic fallback flow
        "initial_navigation" => {
            matches!(last_action, Some(Action::Navigate { .. }))
                || (!url.is_empty() && url != "about:blank")
        }
        "page_interaction" => {
            last_is_click || last_is_input || matches!(last_action, Some(Action::Scroll { .. }))
        }
        "goal_completion" => page_mentions(&["success", "complete", "done", "thank"]),

        _ => false,
    }
}

/// Percent of recognized milestones, 0 when there are none.
pub fn progress_percent(milestones: &[Milestone]) -> f64 {
    if milestones.is_empty() {
        return 0.0;
    }
    let recognized = milestones.iter().filter(|m| m.recognized).count();
    recognized as f64 / milestones.len() as f64 * 100.0
}

/// Plain-language description of what changed between two snapshots.
pub fn detect_deltas(previous: &PageSnapshot, current: &PageSnapshot) -> Vec<String> {
    let mut deltas = Vec::new();

    if previous.url != current.url {
        deltas.push(format!(
            "The page URL changed from {} to {}.",
            previous.url, current.url
        ));
    }
    if previous.title != current.title {
        deltas.push(format!(
            "The page title changed from \"{}\" to \"{}\".",
            previous.title, current.title
        ));
    }

    let (pb, pi, pl) = previous.interactive_counts();
    let (cb, ci, cl) = current.interactive_counts();
    for (label, before, after) in [
        ("buttons", pb, cb),
        ("input fields", pi, ci),
        ("links", pl, cl),
    ] {
        if before != after {
            deltas.push(format!(
                "The number of {label} changed from {before} to {after}."
            ));
        }
    }

    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::DEFAULT_MAX_WAIT_MS;

    fn snap(url: &str, title: &str) -> PageSnapshot {
        PageSnapshot {
            url: url.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn login_goal_seeds_the_login_milestones() {
        let milestones = classify_goal("login to my account");
        let names: Vec<_> = milestones.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "reach_login_page",
                "enter_credentials",
                "submit_login",
                "login_successful"
            ]
        );
    }

    #[test]
    fn unknown_goal_falls_back_to_generic_milestones() {
        let milestones = classify_goal("do something unusual");
        let names: Vec<_> = milestones.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            ["initial_navigation", "page_interaction", "goal_completion"]
        );
    }

    #[test]
    fn login_page_url_recognizes_the_first_milestone() {
        let mut milestones = classify_goal("login to my account");
        let feedback = recognize_next(
            &mut milestones,
            &snap("https://example.com/login", "Sign in"),
            None,
        )
        .expect("milestone should be recognized");
        assert!(feedback.contains("Milestone achieved"));
        assert!(feedback.contains("reach_login_page"));
        assert!(milestones[0].recognized);
        assert!(!milestones[1].recognized);
    }

    #[test]
    fn milestones_are_recognized_strictly_in_order() {
        let mut milestones = classify_goal("login to my account");
        // Typing before reaching the login page must not mark
        // enter_credentials: only the next unmet milestone is eligible.
        let typed = Action::Input {
            element: "#user".into(),
            value: "me".into(),
            selector_type: Default::default(),
            max_wait: DEFAULT_MAX_WAIT_MS,
            description: None,
        };
        let feedback = recognize_next(
            &mut milestones,
            &snap("https://example.com/", "Home"),
            Some(&typed),
        );
        assert_eq!(feedback, None);
        assert!(milestones.iter().all(|m| !m.recognized));
    }

    #[test]
    fn percentages_match_recognized_counts() {
        let mut milestones = classify_goal("login to my account");
        assert_eq!(progress_percent(&milestones), 0.0);

        milestones[0].recognized = true;
        milestones[1].recognized = true;
        assert_eq!(progress_percent(&milestones), 50.0);

        for m in milestones.iter_mut() {
            m.recognized = true;
        }
        assert_eq!(progress_percent(&milestones), 100.0);

        assert_eq!(progress_percent(&[]), 0.0);
    }

    #[test]
    fn deltas_cover_url_title_and_counts() {
        let before = snap("https://a.test/", "A");
        let mut after = snap("https://b.test/", "B");
        after.buttons.push(Default::default());

        let deltas = detect_deltas(&before, &after);
        assert_eq!(deltas.len(), 3);
        assert!(deltas[0].contains("URL changed"));
        assert!(deltas[1].contains("title changed"));
        assert!(deltas[2].contains("buttons"));
    }

    #[test]
    fn no_deltas_for_identical_snapshots() {
        let s = snap("https://a.test/", "A");
        assert!(detect_deltas(&s, &s).is_empty());
    }
}
