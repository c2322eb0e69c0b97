//! Default workflow catalog.

use super::{Condition, WorkflowDefinition, WorkflowStep};
use crate::agent::AgentKind;

/// Full pipeline: attachments, knowledge, tools, then chat.
pub const STANDARD_CHAT: &str = "standard_chat";
/// Knowledge lookup answered through chat.
pub const KNOWLEDGE_SEARCH: &str = "knowledge_search";
/// Tool execution answered through chat.
pub const TOOL_EXECUTION: &str = "tool_execution";
/// Attachment analysis with optional knowledge.
pub const MULTIMODAL_ANALYSIS: &str = "multimodal_analysis";

/// The four built-in workflows.
#[must_use]
pub fn default_workflows() -> Vec<WorkflowDefinition> {
    vec![
        WorkflowDefinition::new(
            STANDARD_CHAT,
            "标准对话：多模态分析、知识检索、工具调用后由对话智能体回复",
            vec![
                WorkflowStep::new(AgentKind::Multimodal, 1).when(Condition::HasMultimodal),
                WorkflowStep::new(AgentKind::Knowledge, 2).when(Condition::NeedsKnowledge),
                WorkflowStep::new(AgentKind::Tool, 3).when(Condition::NeedsTools),
                WorkflowStep::new(AgentKind::Chat, 4),
            ],
        ),
        WorkflowDefinition::new(
            KNOWLEDGE_SEARCH,
            "知识检索后由对话智能体回复",
            vec![
                WorkflowStep::new(AgentKind::Knowledge, 1),
                WorkflowStep::new(AgentKind::Chat, 2),
            ],
        ),
        WorkflowDefinition::new(
            TOOL_EXECUTION,
            "工具调用后由对话智能体回复",
            vec![
                WorkflowStep::new(AgentKind::Tool, 1),
                WorkflowStep::new(AgentKind::Chat, 2),
            ],
        ),
        WorkflowDefinition::new(
            MULTIMODAL_ANALYSIS,
            "多模态分析，可选知识检索，由对话智能体回复",
            vec![
                WorkflowStep::new(AgentKind::Multimodal, 1),
                WorkflowStep::new(AgentKind::Knowledge, 2).when(Condition::NeedsKnowledge),
                WorkflowStep::new(AgentKind::Chat, 3),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(workflow: &WorkflowDefinition) -> Vec<(AgentKind, i32, Option<Condition>)> {
        workflow
            .steps
            .iter()
            .map(|s| (s.kind, s.priority, s.condition))
            .collect()
    }

    #[test]
    fn test_catalog_shape() {
        let workflows = default_workflows();
        let names: Vec<&str> = workflows.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(
            names,
            vec![STANDARD_CHAT, KNOWLEDGE_SEARCH, TOOL_EXECUTION, MULTIMODAL_ANALYSIS]
        );

        assert_eq!(
            shape(&workflows[0]),
            vec![
                (AgentKind::Multimodal, 1, Some(Condition::HasMultimodal)),
                (AgentKind::Knowledge, 2, Some(Condition::NeedsKnowledge)),
                (AgentKind::Tool, 3, Some(Condition::NeedsTools)),
                (AgentKind::Chat, 4, None),
            ]
        );
        assert_eq!(
            shape(&workflows[1]),
            vec![(AgentKind::Knowledge, 1, None), (AgentKind::Chat, 2, None)]
        );
        assert_eq!(
            shape(&workflows[2]),
            vec![(AgentKind::Tool, 1, None), (AgentKind::Chat, 2, None)]
        );
        assert_eq!(
            shape(&workflows[3]),
            vec![
                (AgentKind::Multimodal, 1, None),
                (AgentKind::Knowledge, 2, Some(Condition::NeedsKnowledge)),
                (AgentKind::Chat, 3, None),
            ]
        );
    }
}
