use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::{LevelPolicy, ProgressionRecord, Task, TaskType};
use crate::sequencer::{self, Plan};
use crate::topic::TopicName;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskTypeSummary {
    pub task_type: TaskType,
    pub count: usize,
    pub completed: usize,
    pub avg_score: f64,
}

pub fn summarize_by_type(tasks: &[Task]) -> Vec<TaskTypeSummary> {
    let mut map: BTreeMap<TaskType, (usize, usize, i32)> = BTreeMap::new();

    for task in tasks {
        let entry = map.entry(task.task_type).or_insert((0, 0, 0));
        entry.0 += 1;
        if task.is_completed() {
            entry.1 += 1;
            entry.2 += task.task_score;
        }
    }

    map.into_iter()
        .map(|(task_type, (count, completed, total_score))| TaskTypeSummary {
            task_type,
            count,
            completed,
            avg_score: if completed == 0 {
                0.0
            } else {
                total_score as f64 / completed as f64
            },
        })
        .collect()
}

/// What the learner would be sent to next, without creating anything.
pub fn describe_next(tasks: &[Task], policy: &LevelPolicy) -> String {
    match sequencer::plan(tasks, policy) {
        Some(Plan::Resume(task)) => format!("resume {} at level {}", task.task_type, task.level),
        Some(Plan::Start(task_type, level)) => format!("start {task_type} at level {level}"),
        Some(Plan::Finished(_)) => "topic finished".to_string(),
        None => "unknown".to_string(),
    }
}

fn topic_key(raw: &str) -> String {
    TopicName::parse(raw)
        .map(|topic| topic.db_form())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn build_report(
    user_id: &str,
    records: &[ProgressionRecord],
    tasks: &[Task],
    policy: &LevelPolicy,
) -> String {
    let mut topics: BTreeMap<String, (Option<&ProgressionRecord>, Vec<Task>)> = BTreeMap::new();
    for record in records {
        topics.entry(topic_key(&record.topic_name)).or_default().0 = Some(record);
    }
    for task in tasks {
        topics
            .entry(topic_key(&task.topic_name))
            .or_default()
            .1
            .push(task.clone());
    }

    let mut output = String::new();

    let _ = writeln!(output, "# Learning Progress Report");
    let _ = writeln!(output, "Generated for {}", user_id);
    let _ = writeln!(output);

    if topics.is_empty() {
        let _ = writeln!(output, "No activity recorded yet.");
        return output;
    }

    for (topic, (record, topic_tasks)) in &topics {
        let _ = writeln!(output, "## {}", topic);
        match record {
            Some(record) => {
                let _ = writeln!(
                    output,
                    "Level {} (score {})",
                    record.level, record.earned_score
                );
            }
            None => {
                let _ = writeln!(output, "Level not recorded yet");
            }
        }

        let summaries = summarize_by_type(topic_tasks);
        if summaries.is_empty() {
            let _ = writeln!(output, "- no tasks yet");
        } else {
            for summary in summaries.iter() {
                let _ = writeln!(
                    output,
                    "- {}: {}/{} completed (avg score {:.1})",
                    summary.task_type, summary.completed, summary.count, summary.avg_score
                );
            }
        }

        let _ = writeln!(output, "Next: {}", describe_next(topic_tasks, policy));
        let _ = writeln!(output);
    }

    output
}
