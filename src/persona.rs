//! Kaiwa persona and the first-turn rule

use log::debug;

/// Bumped whenever PERSONA_PROMPT changes wording
pub const PERSONA_REVISION: u32 = 2;

pub const PERSONA_NAME: &str = "Kaiwa";

pub const PERSONA_PROMPT: &str = "\
You are Kaiwa, a friendly and patient Japanese conversation partner.
Your job is to help the user practise everyday Japanese conversation.
- Always reply in Japanese.
- Use hiragana, katakana and kanji as the context calls for.
- Keep answers natural and easy to follow.
- Do not answer in the user's native language.
- Keep the tone casual and focused on conversation practice.
- Prefer expressions that are common in daily life.
- Do not add romaji unless the user asks for it.

日本語で会話練習をしましょう！";

/// The system message prepended on the first turn
pub fn persona_message() -> crate::ConversationMessage
{   crate::ConversationMessage::system(PERSONA_PROMPT)
}

/// Empty list, or a single message from the user
pub fn is_first_turn(messages: &[crate::ConversationMessage]) -> bool
{   match messages
    {   [] => true
      , [only] => only.role == crate::Role::User
      , _ => false
    }
}

/// Produce the list that will actually be dispatched.
///
/// The caller's messages keep their order; at most one persona
/// message is put in front of them.
pub fn prepare_conversation(
  messages: Vec<crate::ConversationMessage>
, turn: crate::Turn
) -> Vec<crate::ConversationMessage>
{   let inject = match turn
    {   crate::Turn::Infer => is_first_turn(&messages)
      , crate::Turn::First => true
      , crate::Turn::Continuation => false
    };

    debug!(
      "Preparing {} messages (turn: {:?}, persona: {})",
      messages.len(), turn, inject
    );

    if !inject
    {   return messages;
    }

    let mut prepared = Vec::with_capacity(messages.len() + 1);
    prepared.push(persona_message());
    prepared.extend(messages);
    prepared
}
