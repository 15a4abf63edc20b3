//! Branch Resolver
//!
//! Turns a node into the ordered lines a viewer actually sees. Lines tagged
//! `OnlyAlly` are shown only when their speaker resolves to an ally; the
//! first such line that is shown jumps playback to the node's ally sequence
//! for the rest of the node. The jump happens at most once and never returns
//! to the main sequence.

use std::sync::Arc;

use super::node::{Audience, DialogueNode, LineElement};
use crate::speaker::SpeakerCache;

/// Answers whether a speaker is ally-affiliated; `None` when unknown
pub trait AllyPredicate {
    fn is_ally(&mut self, speaker_id: &str) -> Option<bool>;
}

impl<F> AllyPredicate for F
where
    F: FnMut(&str) -> Option<bool>,
{
    fn is_ally(&mut self, speaker_id: &str) -> Option<bool> {
        self(speaker_id)
    }
}

impl AllyPredicate for SpeakerCache {
    fn is_ally(&mut self, speaker_id: &str) -> Option<bool> {
        SpeakerCache::is_ally(self, speaker_id)
    }
}

/// Which sequence a resolved line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Main,
    Ally,
}

/// A line that passed the audience filter
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLine {
    pub sequence: Sequence,
    /// Position within its sequence
    pub index: usize,
    /// Override speaker, else the node default
    pub speaker_id: String,
    pub element: LineElement,
}

/// Audience filter. Unknown or missing speakers fail closed.
pub fn should_output<P: AllyPredicate + ?Sized>(
    line: &LineElement,
    default_speaker: &str,
    predicate: &mut P,
) -> bool {
    match line.audience {
        Audience::Any => true,
        Audience::OnlyAlly => {
            let speaker = line.speaker_or(default_speaker);
            !speaker.is_empty() && predicate.is_ally(speaker).unwrap_or(false)
        }
    }
}

fn resolved(node: &DialogueNode, sequence: Sequence, index: usize, line: &LineElement) -> ResolvedLine {
    ResolvedLine {
        sequence,
        index,
        speaker_id: line.speaker_or(&node.speaker).to_string(),
        element: line.clone(),
    }
}

/// Materialize every visible line of a node up front
pub fn resolve_lines<P: AllyPredicate + ?Sized>(
    node: &DialogueNode,
    predicate: &mut P,
) -> Vec<ResolvedLine> {
    let mut lines = Vec::new();

    for (i, line) in node.main.iter().enumerate() {
        if !should_output(line, &node.speaker, predicate) {
            continue;
        }
        lines.push(resolved(node, Sequence::Main, i, line));

        if line.audience == Audience::OnlyAlly {
            for (j, ally_line) in node.ally.iter().enumerate() {
                if should_output(ally_line, &node.speaker, predicate) {
                    lines.push(resolved(node, Sequence::Ally, j, ally_line));
                }
            }
            break;
        }
    }

    lines
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Main,
    Ally,
    Done,
}

/// Pull-based form of [`resolve_lines`]. Each instance owns its cursor, so
/// concurrent sessions never share iteration state.
pub struct BranchLines<P> {
    node: Arc<DialogueNode>,
    predicate: P,
    phase: Phase,
    cursor: usize,
    jumped: bool,
}

impl<P: AllyPredicate> BranchLines<P> {
    pub fn new(node: Arc<DialogueNode>, predicate: P) -> Self {
        Self {
            node,
            predicate,
            phase: Phase::Main,
            cursor: 0,
            jumped: false,
        }
    }

    /// Whether the cross-jump to the ally sequence has happened
    pub fn jumped(&self) -> bool {
        self.jumped
    }
}

impl<P: AllyPredicate> Iterator for BranchLines<P> {
    type Item = ResolvedLine;

    fn next(&mut self) -> Option<ResolvedLine> {
        loop {
            match self.phase {
                Phase::Main => {
                    let index = self.cursor;
                    let Some(line) = self.node.main.get(index) else {
                        self.phase = Phase::Done;
                        return None;
                    };
                    self.cursor += 1;

                    if !should_output(line, &self.node.speaker, &mut self.predicate) {
                        continue;
                    }
                    let out = resolved(&self.node, Sequence::Main, index, line);
                    if line.audience == Audience::OnlyAlly {
                        self.phase = Phase::Ally;
                        self.cursor = 0;
                        self.jumped = true;
                    }
                    return Some(out);
                }
                Phase::Ally => {
                    let index = self.cursor;
                    let Some(line) = self.node.ally.get(index) else {
                        self.phase = Phase::Done;
                        return None;
                    };
                    self.cursor += 1;

                    if should_output(line, &self.node.speaker, &mut self.predicate) {
                        return Some(resolved(&self.node, Sequence::Ally, index, line));
                    }
                }
                Phase::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speaker::{Affiliation, SpeakerDirectory, SpeakerRecord};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn node() -> Arc<DialogueNode> {
        let mut node = DialogueNode::new("S1", "elder");
        node.main = vec![
            LineElement::new("main0", Audience::Any),
            LineElement::new("main1", Audience::OnlyAlly).with_speaker("guard"),
            LineElement::new("main2", Audience::Any),
        ];
        node.ally = vec![LineElement::new("ally0", Audience::Any)];
        Arc::new(node)
    }

    fn texts(lines: &[ResolvedLine]) -> Vec<&str> {
        lines.iter().map(|l| l.element.text.as_str()).collect()
    }

    #[test]
    fn test_jump_after_emitted_ally_line() {
        let node = node();
        let mut allies = |id: &str| Some(id == "guard");

        let eager = resolve_lines(&node, &mut allies);
        assert_eq!(texts(&eager), vec!["main0", "main1", "ally0"]);
        assert_eq!(eager[1].speaker_id, "guard");
        assert_eq!(eager[2].sequence, Sequence::Ally);

        let lazy: Vec<_> = BranchLines::new(node, |id: &str| Some(id == "guard")).collect();
        assert_eq!(lazy, eager);
    }

    #[test]
    fn test_no_jump_when_ally_line_filtered() {
        let node = node();
        let eager = resolve_lines(&node, &mut |_: &str| Some(false));
        assert_eq!(texts(&eager), vec!["main0", "main2"]);

        let mut lazy = BranchLines::new(node, |_: &str| Some(false));
        let collected: Vec<_> = lazy.by_ref().collect();
        assert_eq!(collected, eager);
        assert!(!lazy.jumped());
    }

    #[test]
    fn test_unknown_speaker_fails_closed() {
        let node = node();
        let eager = resolve_lines(&node, &mut |_: &str| -> Option<bool> { None });
        assert_eq!(texts(&eager), vec!["main0", "main2"]);

        let mut empty_speaker = DialogueNode::new("S2", "");
        empty_speaker.main = vec![LineElement::new("hidden", Audience::OnlyAlly)];
        assert!(resolve_lines(&empty_speaker, &mut |_: &str| Some(true)).is_empty());
    }

    #[test]
    fn test_ally_sequence_filtered_and_single_jump() {
        let mut node = DialogueNode::new("S3", "elder");
        node.main = vec![
            LineElement::new("intro", Audience::OnlyAlly),
            LineElement::new("never", Audience::OnlyAlly),
        ];
        node.ally = vec![
            LineElement::new("a0", Audience::Any),
            LineElement::new("a1", Audience::OnlyAlly).with_speaker("bandit"),
            LineElement::new("a2", Audience::OnlyAlly),
        ];
        let node = Arc::new(node);
        let predicate = |id: &str| match id {
            "elder" => Some(true),
            "bandit" => Some(false),
            _ => None,
        };

        let mut lazy = BranchLines::new(node.clone(), predicate);
        let collected: Vec<_> = lazy.by_ref().collect();
        assert_eq!(texts(&collected), vec!["intro", "a0", "a2"]);
        assert!(lazy.jumped());
        assert_eq!(lazy.next(), None);

        let mut predicate = predicate;
        assert_eq!(resolve_lines(&node, &mut predicate), collected);
    }

    #[test]
    fn test_ally_sequence_unused_without_ally_lines() {
        let mut node = DialogueNode::new("S4", "elder");
        node.main = vec![LineElement::new("only", Audience::Any)];
        node.ally = vec![LineElement::new("unused", Audience::Any)];
        let lines: Vec<_> = BranchLines::new(Arc::new(node), |_: &str| Some(true)).collect();
        assert_eq!(texts(&lines), vec!["only"]);
    }

    #[test]
    fn test_lazy_pulls_predicate_on_demand() {
        let node = node();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let seen = calls.clone();
        let mut lazy = BranchLines::new(node, move |id: &str| {
            seen.borrow_mut().push(id.to_string());
            Some(true)
        });

        assert_eq!(lazy.next().map(|l| l.element.text), Some("main0".to_string()));
        assert!(calls.borrow().is_empty());
        assert_eq!(lazy.next().map(|l| l.element.text), Some("main1".to_string()));
        assert_eq!(*calls.borrow(), vec!["guard".to_string()]);
    }

    struct Roster;

    impl SpeakerDirectory for Roster {
        fn speakers(&self) -> Vec<SpeakerRecord> {
            vec![SpeakerRecord {
                id: "guard".to_string(),
                display_name: "Guard".to_string(),
                affiliation: Affiliation::Ally,
                anchor: None,
            }]
        }
    }

    #[test]
    fn test_speaker_cache_as_predicate() {
        let node = node();
        let mut cache = SpeakerCache::new(Box::new(Roster));
        assert_eq!(texts(&resolve_lines(&node, &mut cache)), vec!["main0", "main1", "ally0"]);

        let lazy: Vec<_> = BranchLines::new(node, SpeakerCache::new(Box::new(Roster))).collect();
        assert_eq!(texts(&lazy), vec!["main0", "main1", "ally0"]);
    }
}
