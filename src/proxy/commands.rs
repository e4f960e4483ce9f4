//! Slash commands embedded in chat content
//!
//! The first whitespace token of the last user message selects a command.
//! Recognized commands are handled entirely inside the proxy and answered
//! with a synthetic stream; unknown tokens fall through to normal
//! forwarding.

/// Response body of the `/testmessage` command
pub const TEST_RESPONSE: &str = "This is a test response answering your testmessage!";

/// Command table returned by `/help`
pub const HELP_TEXT: &str = "| Command | Description |\n\
    |---------|-------------|\n\
    | `/chatwithfile <filename.pdf>` | Load a PDF file and chat with it |\n\
    | `/chatwithwebsite <URL>` | Load a website and chat with it |\n\
    | `/chatwithwebsite /deep <URL>` | Load a website, visit all sublinks, and chat with it |\n\
    | `/forgetcontext` | Disable background injection of content |\n\
    | `/testmessage` | Receive a fixed test response |\n";

/// A recognized slash command, or a usage correction for a malformed one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    TestMessage,
    ChatWithFile { path: String },
    ChatWithWebsite { url: String, deep: bool },
    ForgetContext,
    Usage(&'static str),
}

impl SlashCommand {
    /// Parse the leading token of `user_text`. Returns `None` when the
    /// message does not start with a recognized command.
    pub fn parse(user_text: &str) -> Option<Self> {
        let tokens: Vec<&str> = user_text.split_whitespace().collect();
        let command = tokens.first()?.to_lowercase();
        let args = &tokens[1..];

        match command.as_str() {
            "/help" => Some(Self::Help),
            "/testmessage" => Some(Self::TestMessage),
            "/forgetcontext" => Some(Self::ForgetContext),
            "/chatwithfile" => {
                if args.len() == 1 {
                    Some(Self::ChatWithFile {
                        path: args[0].to_string(),
                    })
                } else {
                    Some(Self::Usage("Usage: /chatwithfile <Path to PDF file>"))
                }
            }
            "/chatwithwebsite" => {
                if args.first() == Some(&"/deep") {
                    if args.len() == 2 {
                        Some(Self::ChatWithWebsite {
                            url: args[1].to_string(),
                            deep: true,
                        })
                    } else {
                        Some(Self::Usage("Usage: /chatwithwebsite /deep <URL>"))
                    }
                } else if args.len() == 1 {
                    Some(Self::ChatWithWebsite {
                        url: args[0].to_string(),
                        deep: false,
                    })
                } else {
                    Some(Self::Usage("Usage: /chatwithwebsite <URL>"))
                }
            }
            _ => None,
        }
    }
}
