// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Client-visible MySQL error codes

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ErrAccessDeniedError,
    ErrBadDbError,
    ErrUnknownComError,
    ErrNotSupportedAuthMode,
    ErrAuthPluginNotLoaded,
    ErrChangeToSslConnectionFailed,
    ErrUnknownError,
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::ErrAccessDeniedError => 1045,
            ErrorCode::ErrBadDbError => 1049,
            ErrorCode::ErrUnknownComError => 1047,
            ErrorCode::ErrNotSupportedAuthMode => 1251,
            ErrorCode::ErrAuthPluginNotLoaded => 1524,
            ErrorCode::ErrChangeToSslConnectionFailed => 1105,
            ErrorCode::ErrUnknownError => 1105,
        }
    }

    pub fn sql_state(&self) -> &'static str {
        match self {
            ErrorCode::ErrAccessDeniedError => "28000",
            ErrorCode::ErrBadDbError => "42000",
            ErrorCode::ErrUnknownComError => "08S01",
            ErrorCode::ErrNotSupportedAuthMode => "08004",
            ErrorCode::ErrAuthPluginNotLoaded
            | ErrorCode::ErrChangeToSslConnectionFailed
            | ErrorCode::ErrUnknownError => "HY000",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            ErrorCode::ErrAccessDeniedError => "Access denied for user '%s' (using password: %s)",
            ErrorCode::ErrBadDbError => "Unknown database '%s'",
            ErrorCode::ErrUnknownComError => "Unknown command",
            ErrorCode::ErrNotSupportedAuthMode => {
                "Client does not support authentication protocol requested by server; consider upgrading MySQL client"
            }
            ErrorCode::ErrAuthPluginNotLoaded => "Plugin '%s' is not loaded",
            ErrorCode::ErrChangeToSslConnectionFailed => "Failed to change to SSL connection",
            ErrorCode::ErrUnknownError => "%s",
        }
    }

    /// Substitute `%s` placeholders in order; missing args render empty.
    pub fn format_message(&self, args: &[&str]) -> String {
        let mut args = args.iter();
        let mut out = String::new();
        let mut parts = self.template().split("%s").peekable();
        while let Some(part) = parts.next() {
            out.push_str(part);
            if parts.peek().is_some() {
                out.push_str(args.next().copied().unwrap_or(""));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_message() {
        let msg = ErrorCode::ErrAccessDeniedError.format_message(&["root", "YES"]);
        assert_eq!(msg, "Access denied for user 'root' (using password: YES)");
        assert_eq!(ErrorCode::ErrAccessDeniedError.code(), 1045);
        assert_eq!(ErrorCode::ErrAccessDeniedError.sql_state(), "28000");
    }

    #[test]
    fn test_missing_args_render_empty() {
        let msg = ErrorCode::ErrAccessDeniedError.format_message(&[]);
        assert_eq!(msg, "Access denied for user '' (using password: )");
    }

    #[test]
    fn test_no_placeholder() {
        let msg = ErrorCode::ErrNotSupportedAuthMode.format_message(&["ignored"]);
        assert!(msg.starts_with("Client does not support authentication protocol"));
    }
}
