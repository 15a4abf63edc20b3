//! Quest State Tracking
//!
//! Per-quest runtime state: requirement counters, the current step and the
//! active/completed lifecycle. Definitions stay immutable behind an `Arc`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::definition::{QuestDefinition, RequirementDefinition, RewardBundle};
use super::events::{DomainEvent, QuestNotification, RewardHook};
use crate::error::QuestError;

/// Runtime progress on a single requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementProgress {
    pub current: i32,
    pub required: i32,
    pub completed: bool,
}

impl RequirementProgress {
    pub fn new(required: i32) -> Self {
        Self {
            current: 0,
            required,
            completed: false,
        }
    }

    /// Add progress and return true if newly completed
    pub fn add_progress(&mut self, amount: i32) -> bool {
        if self.completed {
            return false;
        }
        self.current = self.current.saturating_add(amount.max(1)).min(self.required);
        self.completed = self.current >= self.required;
        self.completed
    }

    /// Set progress directly, never lowering it
    pub fn restore_progress(&mut self, amount: i32) {
        self.current = amount.clamp(self.current, self.required);
        self.completed = self.current >= self.required;
    }

    pub fn reset(&mut self) {
        self.current = 0;
        self.completed = false;
    }
}

/// Runtime progress on one step: one entry per requirement definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgress {
    requirements: Vec<RequirementProgress>,
}

impl StepProgress {
    fn new(definitions: &[RequirementDefinition]) -> Self {
        Self {
            requirements: definitions
                .iter()
                .map(|d| RequirementProgress::new(d.required))
                .collect(),
        }
    }

    /// Forward an event to every matching requirement. Returns true if any
    /// requirement changed.
    fn apply(&mut self, definitions: &[RequirementDefinition], event: &DomainEvent) -> bool {
        let mut changed = false;
        for (def, progress) in definitions.iter().zip(self.requirements.iter_mut()) {
            if progress.completed || !def.matches(&event.event_type, event.key()) {
                continue;
            }
            let before = progress.current;
            progress.add_progress(event.amount());
            debug!(
                "Requirement {}:{:?} {} -> {}/{}",
                def.event_type, def.key_filter, before, progress.current, progress.required
            );
            changed = true;
        }
        changed
    }

    /// AND over every requirement
    pub fn is_complete(&self) -> bool {
        self.requirements.iter().all(|r| r.completed)
    }

    pub fn requirements(&self) -> &[RequirementProgress] {
        &self.requirements
    }

    fn reset(&mut self) {
        for r in &mut self.requirements {
            r.reset();
        }
    }
}

/// Serializable view of a quest instance for external save systems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestSnapshot {
    pub quest_id: String,
    pub active: bool,
    pub completed: bool,
    pub current_step: usize,
    /// `current` of every requirement, per step
    pub progress: Vec<Vec<i32>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// Runtime state of one quest
#[derive(Debug, Clone)]
pub struct QuestInstance {
    definition: Arc<QuestDefinition>,
    steps: Vec<StepProgress>,
    active: bool,
    completed: bool,
    current_step: usize,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl QuestInstance {
    pub fn new(definition: Arc<QuestDefinition>) -> Self {
        let steps = definition
            .steps
            .iter()
            .map(|s| StepProgress::new(s.condition.requirements()))
            .collect();
        Self {
            definition,
            steps,
            active: false,
            completed: false,
            current_step: 0,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &Arc<QuestDefinition> {
        &self.definition
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn step_progress(&self, index: usize) -> Option<&StepProgress> {
        self.steps.get(index)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Start the quest. Returns `Ok(false)` when it was already active.
    pub fn start(
        &mut self,
        reset_steps: bool,
        out: &mut Vec<QuestNotification>,
    ) -> Result<bool, QuestError> {
        if self.completed {
            return Err(QuestError::AlreadyCompleted(self.id().to_string()));
        }
        if self.active {
            return Ok(false);
        }

        if reset_steps {
            for step in &mut self.steps {
                step.reset();
            }
        }
        self.current_step = 0;
        self.active = true;
        self.started_at = Some(Utc::now());

        info!("Quest '{}' started", self.id());
        out.push(QuestNotification::Started {
            quest_id: self.id().to_string(),
        });
        self.enter_step(0, out);
        Ok(true)
    }

    /// Stop an active quest. Completion state is left untouched and the
    /// current step's exit reward is not emitted.
    pub fn stop(&mut self, out: &mut Vec<QuestNotification>) -> Result<(), QuestError> {
        if !self.active {
            return Err(QuestError::NotActive(self.id().to_string()));
        }
        self.active = false;
        info!("Quest '{}' stopped at step {}", self.id(), self.current_step);
        out.push(QuestNotification::Stopped {
            quest_id: self.id().to_string(),
        });
        Ok(())
    }

    /// Feed a domain event to the current step. Returns true if the step
    /// advanced.
    pub fn on_event(
        &mut self,
        event: &DomainEvent,
        out: &mut Vec<QuestNotification>,
    ) -> Result<bool, QuestError> {
        if !self.active || self.completed {
            return Ok(false);
        }

        let index = self.current_step;
        if index >= self.steps.len() {
            return Err(self.out_of_range(index));
        }

        let requirements = self.definition.steps[index].condition.requirements();
        let step = &mut self.steps[index];
        step.apply(requirements, event);
        if !step.is_complete() {
            return Ok(false);
        }

        self.advance_step(out)?;
        Ok(true)
    }

    /// Leave the current step. Moving onto `step_count` completes the quest;
    /// anything past that is rejected.
    pub fn advance_step(&mut self, out: &mut Vec<QuestNotification>) -> Result<(), QuestError> {
        let step_count = self.definition.step_count();
        let next = self.current_step + 1;
        if next > step_count {
            return Err(self.out_of_range(next));
        }
        if !self.active {
            return Err(QuestError::NotActive(self.id().to_string()));
        }

        let exit_reward = self.definition.steps[self.current_step].exit_reward.clone();
        self.emit_reward(RewardHook::StepExit(self.current_step), exit_reward, out);
        self.current_step = next;

        if next == step_count {
            self.completed = true;
            self.active = false;
            self.completed_at = Some(Utc::now());
            let reward = self.definition.completion_reward.clone();
            self.emit_reward(RewardHook::QuestCompleted, reward, out);
            info!("Quest '{}' completed", self.id());
            out.push(QuestNotification::Completed {
                quest_id: self.id().to_string(),
            });
        } else {
            self.enter_step(next, out);
        }
        Ok(())
    }

    fn enter_step(&mut self, index: usize, out: &mut Vec<QuestNotification>) {
        let enter_reward = self.definition.steps[index].enter_reward.clone();
        self.emit_reward(RewardHook::StepEnter(index), enter_reward, out);
        debug!("Quest '{}' entered step {}", self.id(), index);
        out.push(QuestNotification::StepChanged {
            quest_id: self.id().to_string(),
            index,
        });
    }

    fn emit_reward(
        &self,
        hook: RewardHook,
        bundle: Option<RewardBundle>,
        out: &mut Vec<QuestNotification>,
    ) {
        if let Some(bundle) = bundle.filter(|b| !b.is_empty()) {
            out.push(QuestNotification::Reward {
                quest_id: self.id().to_string(),
                hook,
                bundle,
            });
        }
    }

    fn out_of_range(&self, index: usize) -> QuestError {
        QuestError::StepOutOfRange {
            quest_id: self.id().to_string(),
            index,
            step_count: self.definition.step_count(),
        }
    }

    pub fn snapshot(&self) -> QuestSnapshot {
        QuestSnapshot {
            quest_id: self.id().to_string(),
            active: self.active,
            completed: self.completed,
            current_step: self.current_step,
            progress: self
                .steps
                .iter()
                .map(|s| s.requirements.iter().map(|r| r.current).collect())
                .collect(),
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }

    /// Apply a snapshot taken from an instance of the same definition
    pub fn restore(&mut self, snapshot: &QuestSnapshot) -> Result<(), QuestError> {
        if snapshot.quest_id != self.id() {
            return Err(QuestError::UnknownQuest(snapshot.quest_id.clone()));
        }
        let step_count = self.definition.step_count();
        if snapshot.current_step > step_count {
            return Err(self.out_of_range(snapshot.current_step));
        }

        for (step, counts) in self.steps.iter_mut().zip(&snapshot.progress) {
            step.reset();
            for (req, current) in step.requirements.iter_mut().zip(counts) {
                req.restore_progress(*current);
            }
        }

        self.current_step = snapshot.current_step;
        self.completed = snapshot.completed || snapshot.current_step == step_count;
        self.active = snapshot.active && !self.completed;
        self.started_at = snapshot.started_at;
        self.completed_at = snapshot.completed_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::definition::{StepCondition, StepDefinition};

    fn req(event: &str, key: Option<&str>, count: i32) -> RequirementDefinition {
        RequirementDefinition::new(event, key, count)
    }

    fn two_step_quest() -> Arc<QuestDefinition> {
        let mut first = StepDefinition::new(
            "S0",
            StepCondition::Single(req("npc_interaction", Some("elder"), 1)),
        );
        first.enter_reward = Some(RewardBundle {
            exp: 5,
            ..Default::default()
        });
        first.exit_reward = Some(RewardBundle {
            gold: 3,
            ..Default::default()
        });
        let second = StepDefinition::new(
            "S1",
            StepCondition::All(vec![
                req("monster_killed", Some("slime"), 3),
                req("item_collected", None, 2),
            ]),
        );
        Arc::new(QuestDefinition {
            id: "first_hunt".to_string(),
            name: "First Hunt".to_string(),
            steps: vec![first, second],
            completion_reward: Some(RewardBundle {
                exp: 50,
                gold: 25,
                items: vec![],
            }),
        })
    }

    fn step_changes(out: &[QuestNotification]) -> Vec<usize> {
        out.iter()
            .filter_map(|n| match n {
                QuestNotification::StepChanged { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_requirement_progress() {
        let mut req = RequirementProgress::new(5);
        assert!(!req.completed);

        assert!(!req.add_progress(3));
        assert_eq!(req.current, 3);

        assert!(req.add_progress(4));
        assert!(req.completed);
        assert_eq!(req.current, 5);

        // Can't add more after complete
        assert!(!req.add_progress(1));
        assert_eq!(req.current, 5);
    }

    #[test]
    fn test_requirement_monotonic() {
        let mut req = RequirementProgress::new(10);
        let mut last = req.current;
        for amount in [-3, 0, 1, 4, 2, 9] {
            req.add_progress(amount);
            assert!(req.current >= last);
            assert_eq!(req.completed, req.current >= req.required);
            last = req.current;
        }
        req.restore_progress(2);
        assert_eq!(req.current, 10);
    }

    #[test]
    fn test_step_and_semantics_all_combinations() {
        for n in 1..=4usize {
            let defs: Vec<_> = (0..n).map(|i| req(&format!("e{}", i), None, 1)).collect();
            for mask in 0..(1u32 << n) {
                let mut step = StepProgress::new(&defs);
                for i in 0..n {
                    if mask & (1 << i) != 0 {
                        step.apply(&defs, &DomainEvent::simple(format!("e{}", i)));
                    }
                }
                let all_set = mask == (1u32 << n) - 1;
                assert_eq!(step.is_complete(), all_set, "n={} mask={:b}", n, mask);
            }
        }
    }

    #[test]
    fn test_start_emits_step_zero_once() {
        let mut quest = QuestInstance::new(two_step_quest());
        let mut out = Vec::new();

        assert_eq!(quest.start(true, &mut out), Ok(true));
        assert_eq!(step_changes(&out), vec![0]);
        assert_eq!(out[0].kind(), "started");
        assert!(matches!(
            out[1],
            QuestNotification::Reward {
                hook: RewardHook::StepEnter(0),
                ..
            }
        ));

        // Second start is a no-op
        let mut again = Vec::new();
        assert_eq!(quest.start(true, &mut again), Ok(false));
        assert!(again.is_empty());
    }

    #[test]
    fn test_events_advance_and_complete() {
        let mut quest = QuestInstance::new(two_step_quest());
        let mut out = Vec::new();
        quest.start(true, &mut out).unwrap();
        out.clear();

        // Wrong key does nothing
        assert_eq!(
            quest.on_event(&DomainEvent::keyed("npc_interaction", "guard"), &mut out),
            Ok(false)
        );
        assert_eq!(
            quest.on_event(&DomainEvent::keyed("npc_interaction", "elder"), &mut out),
            Ok(true)
        );
        assert_eq!(quest.current_step(), 1);
        assert_eq!(step_changes(&out), vec![1]);

        out.clear();
        quest
            .on_event(&DomainEvent::new("monster_killed", Some("slime"), 5), &mut out)
            .unwrap();
        assert_eq!(quest.step_progress(1).unwrap().requirements()[0].current, 3);
        assert!(quest.is_active());

        quest
            .on_event(&DomainEvent::new("item_collected", Some("ore"), 2), &mut out)
            .unwrap();
        assert!(quest.is_completed());
        assert!(!quest.is_active());
        assert_eq!(quest.current_step(), 2);
        assert!(out.iter().any(|n| n.kind() == "completed"));
        assert!(out.iter().any(|n| matches!(
            n,
            QuestNotification::Reward {
                hook: RewardHook::QuestCompleted,
                ..
            }
        )));

        // Inert once completed
        assert_eq!(
            quest.on_event(&DomainEvent::simple("item_collected"), &mut out),
            Ok(false)
        );
        assert!(matches!(
            quest.start(true, &mut out),
            Err(QuestError::AlreadyCompleted(_))
        ));
    }

    #[test]
    fn test_advance_boundary_inclusive() {
        let mut quest = QuestInstance::new(two_step_quest());
        let mut out = Vec::new();
        quest.start(true, &mut out).unwrap();

        quest.advance_step(&mut out).unwrap();
        assert_eq!(quest.advance_step(&mut out), Ok(()));
        assert!(quest.is_completed());
        assert!(!quest.is_active());
        assert_eq!(quest.current_step(), 2);

        assert_eq!(
            quest.advance_step(&mut out),
            Err(QuestError::StepOutOfRange {
                quest_id: "first_hunt".to_string(),
                index: 3,
                step_count: 2,
            })
        );
    }

    #[test]
    fn test_stop_and_resume_preserving_progress() {
        let mut quest = QuestInstance::new(two_step_quest());
        let mut out = Vec::new();

        assert!(matches!(quest.stop(&mut out), Err(QuestError::NotActive(_))));

        quest.start(true, &mut out).unwrap();
        quest.advance_step(&mut out).unwrap();
        quest
            .on_event(&DomainEvent::new("monster_killed", Some("slime"), 2), &mut out)
            .unwrap();
        out.clear();

        quest.stop(&mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), "stopped");
        assert!(!quest.is_active());
        assert!(!quest.is_completed());

        quest.start(false, &mut out).unwrap();
        assert_eq!(quest.current_step(), 0);
        assert_eq!(quest.step_progress(1).unwrap().requirements()[0].current, 2);

        // Stopping on S0 does not pay its exit reward
        out.clear();
        quest.stop(&mut out).unwrap();
        assert_eq!(out.iter().map(|n| n.kind()).collect::<Vec<_>>(), vec!["stopped"]);
        quest.start(true, &mut out).unwrap();
        assert_eq!(quest.step_progress(1).unwrap().requirements()[0].current, 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let definition = two_step_quest();
        let mut quest = QuestInstance::new(definition.clone());
        let mut out = Vec::new();
        quest.start(true, &mut out).unwrap();
        quest.advance_step(&mut out).unwrap();
        quest
            .on_event(&DomainEvent::new("monster_killed", Some("slime"), 2), &mut out)
            .unwrap();

        let json = quest.snapshot().to_json();
        let snapshot = QuestSnapshot::from_json(&json).unwrap();

        let mut restored = QuestInstance::new(definition);
        restored.restore(&snapshot).unwrap();
        assert!(restored.is_active());
        assert_eq!(restored.current_step(), 1);
        assert_eq!(restored.step_progress(1).unwrap().requirements()[0].current, 2);

        let mut bad = snapshot.clone();
        bad.current_step = 7;
        assert!(restored.restore(&bad).is_err());
    }
}
