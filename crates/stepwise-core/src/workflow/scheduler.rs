//! Step scheduling: which step runs next and how far along a workflow is.
//!
//! A step is eligible when it is pending and every step it depends on is
//! completed. Among eligible steps the lowest sequence wins, so the answer is
//! a pure function of the template and the step rows.

use std::collections::HashMap;

use stepwise_types::error::WorkflowError;
use stepwise_types::template::{StepDefinition, WorkflowTemplate};
use stepwise_types::workflow::{NextStep, Progress, StepStatus, WorkflowStep};
use tracing::debug;

use crate::repository::template::TemplateRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::service::hash::ContentHasher;
use crate::workflow::engine::WorkflowEngine;

/// Completion progress over a workflow's step rows.
pub fn progress(steps: &[WorkflowStep]) -> Progress {
    let total = steps.len();
    let completed = steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .count();
    let percentage = if total == 0 {
        100
    } else {
        // Integer round-half-up of 100 * completed / total.
        ((completed * 200 + total) / (total * 2)) as u8
    };
    Progress {
        percentage,
        completed,
        total,
    }
}

/// Why `def` cannot run yet, or `None` when it is eligible.
fn ineligibility(
    def: &StepDefinition,
    by_step_id: &HashMap<&str, &WorkflowStep>,
) -> Option<String> {
    let Some(row) = by_step_id.get(def.id.as_str()) else {
        return Some("step has no progress row".to_string());
    };
    if row.status != StepStatus::Pending {
        return Some(format!("step is {}", row.status));
    }
    def.depends_on
        .iter()
        .find(|dep| {
            by_step_id
                .get(dep.as_str())
                .is_none_or(|r| r.status != StepStatus::Completed)
        })
        .map(|dep| format!("dependency '{dep}' is not completed"))
}

fn index_rows(steps: &[WorkflowStep]) -> HashMap<&str, &WorkflowStep> {
    steps.iter().map(|s| (s.step_id.as_str(), s)).collect()
}

/// Compute the next eligible step of a workflow.
pub fn next_step(template: &WorkflowTemplate, steps: &[WorkflowStep]) -> NextStep {
    let by_step_id = index_rows(steps);
    let progress = progress(steps);
    let is_complete = progress.completed == progress.total;

    let step = template
        .steps
        .iter()
        .filter(|def| ineligibility(def, &by_step_id).is_none())
        .min_by_key(|def| by_step_id.get(def.id.as_str()).map(|r| r.sequence))
        .cloned();

    NextStep {
        stalled: !is_complete && step.is_none(),
        step,
        is_complete,
        progress,
    }
}

/// Resolve `step_id` to its definition if it may be completed now.
///
/// Any eligible step is accepted, not only the one `next_step` would pick.
pub fn check_eligible<'t>(
    template: &'t WorkflowTemplate,
    steps: &[WorkflowStep],
    step_id: &str,
) -> Result<&'t StepDefinition, WorkflowError> {
    let def = template
        .step(step_id)
        .ok_or_else(|| WorkflowError::StepNotEligible {
            step_id: step_id.to_string(),
            reason: format!("template '{}' has no such step", template.id),
        })?;

    match ineligibility(def, &index_rows(steps)) {
        None => Ok(def),
        Some(reason) => Err(WorkflowError::StepNotEligible {
            step_id: step_id.to_string(),
            reason,
        }),
    }
}

impl<W, T, H> WorkflowEngine<W, T, H>
where
    W: WorkflowRepository,
    T: TemplateRepository,
    H: ContentHasher,
{
    /// The next eligible step of a workflow and its progress.
    ///
    /// A workflow with pending steps but nothing eligible is reported as
    /// `stalled`; it is left as is.
    pub async fn get_next_step(&self, workflow_id: &str) -> Result<NextStep, WorkflowError> {
        let ctx = self.load_context(workflow_id).await?;
        let next = next_step(&ctx.template, &ctx.steps);
        debug!(
            workflow_id = %workflow_id,
            step_id = next.step.as_ref().map(|s| s.id.as_str()).unwrap_or("-"),
            percentage = next.progress.percentage,
            stalled = next.stalled,
            "Computed next step"
        );
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use stepwise_types::template::StepValidation;
    use stepwise_types::workflow::StepData;

    fn def(id: &str, depends_on: &[&str]) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: None,
            actions: vec![],
            depends_on: depends_on.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            validation: StepValidation::default(),
        }
    }

    fn template(steps: Vec<StepDefinition>) -> WorkflowTemplate {
        WorkflowTemplate {
            id: "tpl".to_string(),
            version: "1.0.0".to_string(),
            hash: "h".to_string(),
            title: "Template".to_string(),
            description: None,
            category: None,
            tags: BTreeSet::new(),
            steps,
            metadata: BTreeMap::new(),
        }
    }

    fn rows(template: &WorkflowTemplate) -> Vec<WorkflowStep> {
        template
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| WorkflowStep {
                id: format!("row-{i}"),
                workflow_id: "wf".to_string(),
                step_id: s.id.clone(),
                status: StepStatus::Pending,
                sequence: i as i64 + 1,
                completed_at: None,
                outputs: StepData::new(),
            })
            .collect()
    }

    fn complete(rows: &mut [WorkflowStep], step_id: &str) {
        if let Some(row) = rows.iter_mut().find(|r| r.step_id == step_id) {
            row.status = StepStatus::Completed;
        }
    }

    #[test]
    fn test_two_step_progression() {
        let tpl = template(vec![def("step1", &[]), def("step2", &["step1"])]);
        let mut steps = rows(&tpl);

        let next = next_step(&tpl, &steps);
        assert_eq!(next.step.unwrap().id, "step1");
        assert_eq!(next.progress.percentage, 0);
        assert!(!next.is_complete);

        complete(&mut steps, "step1");
        let next = next_step(&tpl, &steps);
        assert_eq!(next.step.unwrap().id, "step2");
        assert_eq!(next.progress.percentage, 50);

        complete(&mut steps, "step2");
        let next = next_step(&tpl, &steps);
        assert!(next.step.is_none());
        assert!(next.is_complete);
        assert!(!next.stalled);
        assert_eq!(next.progress.percentage, 100);
    }

    #[test]
    fn test_lowest_sequence_wins_among_eligible() {
        let tpl = template(vec![def("root", &[]), def("b", &["root"]), def("c", &["root"])]);
        let mut steps = rows(&tpl);
        complete(&mut steps, "root");

        assert_eq!(next_step(&tpl, &steps).step.unwrap().id, "b");

        // Completing the later sibling first is allowed.
        assert!(check_eligible(&tpl, &steps, "c").is_ok());
        complete(&mut steps, "c");
        assert_eq!(next_step(&tpl, &steps).step.unwrap().id, "b");
    }

    #[test]
    fn test_percentage_rounds_to_nearest() {
        let tpl = template(vec![def("a", &[]), def("b", &[]), def("c", &[])]);
        let mut steps = rows(&tpl);
        complete(&mut steps, "a");
        assert_eq!(progress(&steps).percentage, 33);
        complete(&mut steps, "b");
        assert_eq!(progress(&steps).percentage, 67);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let tpl = template(vec![
            def("a", &[]),
            def("b", &["a"]),
            def("c", &["a"]),
            def("d", &["b", "c"]),
            def("e", &["d"]),
            def("f", &[]),
            def("g", &["f", "e"]),
        ]);
        let mut steps = rows(&tpl);
        let mut last = 0;
        while let Some(step) = next_step(&tpl, &steps).step {
            complete(&mut steps, &step.id);
            let pct = progress(&steps).percentage;
            assert!(pct >= last);
            last = pct;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_next_step_is_deterministic() {
        let tpl = template(vec![def("a", &[]), def("b", &[]), def("c", &["a", "b"])]);
        let steps = rows(&tpl);
        let first = next_step(&tpl, &steps);
        for _ in 0..10 {
            assert_eq!(next_step(&tpl, &steps), first);
        }
    }

    #[test]
    fn test_failed_dependency_stalls() {
        let tpl = template(vec![def("a", &[]), def("b", &["a"])]);
        let mut steps = rows(&tpl);
        steps[0].status = StepStatus::Failed;

        let next = next_step(&tpl, &steps);
        assert!(next.step.is_none());
        assert!(!next.is_complete);
        assert!(next.stalled);
    }

    #[test]
    fn test_check_eligible_reasons() {
        let tpl = template(vec![def("a", &[]), def("b", &["a"])]);
        let mut steps = rows(&tpl);

        match check_eligible(&tpl, &steps, "b").unwrap_err() {
            WorkflowError::StepNotEligible { reason, .. } => {
                assert_eq!(reason, "dependency 'a' is not completed")
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = check_eligible(&tpl, &steps, "zzz").unwrap_err();
        assert!(matches!(err, WorkflowError::StepNotEligible { .. }));

        complete(&mut steps, "a");
        match check_eligible(&tpl, &steps, "a").unwrap_err() {
            WorkflowError::StepNotEligible { reason, .. } => assert_eq!(reason, "step is completed"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
