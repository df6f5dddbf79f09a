//! Context window budget
//!
//! A rough character based estimate; good enough to refuse requests that
//! would obviously overflow instead of letting the backend fail opaquely.

use crate::{ProviderError, Result, TurnRequest};

const CHARS_PER_TOKEN: usize = 4;
const MESSAGE_OVERHEAD: usize = 4;

fn tokens_for(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Estimated prompt tokens for a request
pub fn estimate_tokens(request: &TurnRequest) -> u32 {
    let mut total = tokens_for(request.system.len()) + MESSAGE_OVERHEAD;

    for message in &request.messages {
        total += MESSAGE_OVERHEAD + tokens_for(message.content.len());
        for call in &message.tool_calls {
            total += tokens_for(call.id.len() + call.name.len() + call.arguments.to_string().len());
        }
    }

    for tool in &request.tools {
        total += tokens_for(tool.name.len() + tool.description.len())
            + tokens_for(tool.parameters.to_string().len());
    }

    u32::try_from(total).unwrap_or(u32::MAX)
}

/// Reject a request whose prompt plus completion budget exceeds the window
pub fn check_budget(request: &TurnRequest) -> Result<u32> {
    let estimated = estimate_tokens(request);
    let limit = request.limits.context_window;
    if estimated.saturating_add(request.limits.max_tokens) > limit {
        return Err(ProviderError::ContextLimitExceeded { estimated, limit });
    }
    Ok(estimated)
}
