// src/scheduler/graph.rs
//! Explicit task dependency graph
//!
//! Keeps, per task, the set of dependencies that have not completed yet and,
//! per dependency, the tasks waiting on it. `blocked -> pending` is evaluated
//! lazily: only the dependents of a task that just completed are re-checked.

use crate::scheduler::task::TaskId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// task -> dependencies still outstanding
    outstanding: HashMap<TaskId, HashSet<TaskId>>,

    /// dependency -> tasks that declared it
    dependents: HashMap<TaskId, Vec<TaskId>>,

    /// task -> every dependency it declared (kept for dependency outputs)
    declared: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task with its declared dependencies and the subset still outstanding
    pub fn insert(&mut self, task: TaskId, declared: Vec<TaskId>, outstanding: HashSet<TaskId>) {
        for dep in &declared {
            self.dependents.entry(dep.clone()).or_default().push(task.clone());
        }
        if !outstanding.is_empty() {
            self.outstanding.insert(task.clone(), outstanding);
        }
        self.declared.insert(task, declared);
    }

    /// True when nothing is outstanding for `task`
    pub fn is_ready(&self, task: &TaskId) -> bool {
        self.outstanding.get(task).map_or(true, |deps| deps.is_empty())
    }

    /// Mark `task` complete; returns the dependents that just became ready
    pub fn complete(&mut self, task: &TaskId) -> Vec<TaskId> {
        let mut ready = Vec::new();

        if let Some(waiting) = self.dependents.get(task) {
            for dependent in waiting {
                if let Some(deps) = self.outstanding.get_mut(dependent) {
                    deps.remove(task);
                    if deps.is_empty() {
                        self.outstanding.remove(dependent);
                        ready.push(dependent.clone());
                    }
                }
            }
        }

        ready
    }

    /// Tasks that declared `task` as a dependency
    pub fn dependents(&self, task: &TaskId) -> &[TaskId] {
        self.dependents.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dependencies `task` declared at enqueue time
    pub fn declared(&self, task: &TaskId) -> &[TaskId] {
        self.declared.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every trace of a settled task
    pub fn remove(&mut self, task: &TaskId) {
        self.outstanding.remove(task);
        self.dependents.remove(task);
        if let Some(deps) = self.declared.remove(task) {
            for dep in deps {
                if let Some(list) = self.dependents.get_mut(&dep) {
                    list.retain(|t| t != task);
                    if list.is_empty() {
                        self.dependents.remove(&dep);
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}
