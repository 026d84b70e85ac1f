use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::LanguageModel;
use crate::{
    agents::AgentConfig,
    chat::ChatMessage,
    error::{FlowError, Result},
};

/// Canned replies handed out in call order.
pub(crate) enum Reply {
    Text(String),
    Fail(String),
    /// Answers with the text once the gate is opened.
    Held(Arc<Notify>, String),
}

impl Reply {
    pub(crate) fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }

    pub(crate) fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }

    pub(crate) fn held(gate: &Arc<Notify>, text: &str) -> Self {
        Reply::Held(gate.clone(), text.to_string())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AgentCall {
    pub agent_id: String,
    pub content: String,
    pub wants_json: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ChatCall {
    pub history: Vec<ChatMessage>,
    pub new_message: String,
    pub context: String,
}

/// Test double for the model service.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    agent_calls: Mutex<Vec<AgentCall>>,
    chat_calls: Mutex<Vec<ChatCall>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn agent_calls(&self) -> Vec<AgentCall> {
        self.agent_calls.lock().unwrap().clone()
    }

    pub(crate) fn chat_calls(&self) -> Vec<ChatCall> {
        self.chat_calls.lock().unwrap().clone()
    }

    async fn next_reply(&self) -> Result<String> {
        let reply = self.replies.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Held(gate, text)) => {
                gate.notified().await;
                Ok(text)
            }
            Some(Reply::Fail(message)) => Err(FlowError::ModelService(message)),
            None => Err(FlowError::ModelService("no scripted reply left".to_string())),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn run_agent(
        &self,
        agent: &AgentConfig,
        content: &str,
        wants_json: bool,
    ) -> Result<String> {
        self.agent_calls.lock().unwrap().push(AgentCall {
            agent_id: agent.id.clone(),
            content: content.to_string(),
            wants_json,
        });
        self.next_reply().await
    }

    async fn run_chat(
        &self,
        history: &[ChatMessage],
        new_message: &str,
        context: &str,
    ) -> Result<String> {
        self.chat_calls.lock().unwrap().push(ChatCall {
            history: history.to_vec(),
            new_message: new_message.to_string(),
            context: context.to_string(),
        });
        self.next_reply().await
    }
}
