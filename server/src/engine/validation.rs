/// Maximum user identity length (bytes).
pub const MAX_IDENTITY_LENGTH: usize = 64;

/// Maximum display name length.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 64;

/// Maximum room id length. Room ids are opaque and client-supplied;
/// only the size is bounded.
pub const MAX_ROOM_ID_LENGTH: usize = 128;

/// Default maximum message content length (bytes). The effective limit is
/// configurable; this is the fallback.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;

/// Maximum emoji length for a reaction. Generous enough for multi-codepoint
/// sequences (skin tones, ZWJ families).
pub const MAX_EMOJI_LENGTH: usize = 32;

/// Validate a user identity supplied at handshake. Opaque, but must be
/// non-empty after trimming and bounded.
pub fn validate_identity(identity: &str) -> Result<(), String> {
    if identity.trim().is_empty() {
        return Err("user identity cannot be empty".into());
    }
    if identity.len() > MAX_IDENTITY_LENGTH {
        return Err(format!(
            "user identity too long (max {} bytes)",
            MAX_IDENTITY_LENGTH
        ));
    }
    Ok(())
}

/// Validate a display name supplied at handshake.
pub fn validate_display_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("display name cannot be empty".into());
    }
    if name.len() > MAX_DISPLAY_NAME_LENGTH {
        return Err(format!(
            "display name too long (max {} bytes)",
            MAX_DISPLAY_NAME_LENGTH
        ));
    }
    Ok(())
}

/// Validate a room id. Rooms are created implicitly on first join, so there
/// is no registry to check against.
pub fn validate_room_id(room_id: &str) -> Result<(), String> {
    if room_id.trim().is_empty() {
        return Err("room id cannot be empty".into());
    }
    if room_id.len() > MAX_ROOM_ID_LENGTH {
        return Err(format!("room id too long (max {} bytes)", MAX_ROOM_ID_LENGTH));
    }
    Ok(())
}

/// Validate message content against a configured length limit.
pub fn validate_message(content: &str, max_length: usize) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("message cannot be empty".into());
    }
    if content.len() > max_length {
        return Err(format!("message too long (max {} bytes)", max_length));
    }
    Ok(())
}

/// Validate a reaction emoji.
pub fn validate_emoji(emoji: &str) -> Result<(), String> {
    if emoji.trim().is_empty() {
        return Err("emoji cannot be empty".into());
    }
    if emoji.len() > MAX_EMOJI_LENGTH {
        return Err(format!("emoji too long (max {} bytes)", MAX_EMOJI_LENGTH));
    }
    Ok(())
}
