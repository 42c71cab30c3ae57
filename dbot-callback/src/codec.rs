//! Callback token codec.
//!
//! Wire format: `[signature ' ']action[' ' arg]*`.
//!
//! When signing is on, the signature is the first `sign_length` characters of
//! `base64(sha256(unsigned + secret))`. That is tamper evidence for button payloads, not
//! forgery resistance: a 6-character prefix carries about 36 bits, and shorter prefixes trade
//! strength for room under the transport's payload limit.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::args::CallbackArg;
use crate::error::CodecError;

pub const DEFAULT_SIGN_LENGTH: usize = 6;
/// Telegram's `callback_data` limit, in bytes.
pub const DEFAULT_MAX_LEN: usize = 64;
/// Length of a base64-encoded SHA-256 digest.
const MAX_SIGN_LENGTH: usize = 44;

/// Codec settings. The secret is fixed for the lifetime of a bot instance.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub secret: String,
    pub sign: bool,
    pub sign_length: usize,
    pub max_len: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            sign: true,
            sign_length: DEFAULT_SIGN_LENGTH,
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

impl CodecConfig {
    /// Signed tokens keyed by `secret`, default length and limit.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Plain `action arg...` tokens with no signature prefix.
    pub fn unsigned() -> Self {
        Self {
            sign: false,
            ..Self::default()
        }
    }
}

/// A token split into its parts. `args` are the raw wire strings; see [`Self::coerced_args`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCallback {
    pub signature: Option<String>,
    pub action: String,
    pub args: Vec<String>,
}

impl DecodedCallback {
    pub fn coerced_args(&self) -> Vec<CallbackArg> {
        self.args.iter().map(|a| CallbackArg::coerce(a)).collect()
    }
}

/// What the dispatcher needs from a codec: turn an inbound token into an authentic callback.
pub trait CallbackVerifier: Send + Sync {
    /// Decodes `token` and, when signing is on, checks its signature.
    fn open(&self, token: &str) -> Result<DecodedCallback, CodecError>;
}

#[derive(Debug, Clone)]
pub struct CallbackCodec {
    config: CodecConfig,
}

impl CallbackCodec {
    /// `sign_length` is clamped to `1..=44`.
    pub fn new(mut config: CodecConfig) -> Self {
        config.sign_length = config.sign_length.clamp(1, MAX_SIGN_LENGTH);
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn signs(&self) -> bool {
        self.config.sign
    }

    /// Truncated keyed digest of `data`.
    pub fn sign(&self, data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hasher.update(self.config.secret.as_bytes());
        let digest = STANDARD.encode(hasher.finalize());
        digest[..self.config.sign_length].to_string()
    }

    /// Joins `action` and `args` with single spaces and prepends the signature when signing is on.
    ///
    /// Fails when an argument contains a space, the action name is empty or has whitespace, or
    /// the token would exceed `max_len` bytes.
    pub fn encode<S: AsRef<str>>(&self, action: &str, args: &[S]) -> Result<String, CodecError> {
        if action.is_empty() {
            return Err(CodecError::EmptyAction);
        }
        if action.chars().any(char::is_whitespace) {
            return Err(CodecError::InvalidAction(action.to_string()));
        }

        let mut unsigned = String::from(action);
        for arg in args {
            let arg = arg.as_ref();
            if arg.contains(' ') {
                return Err(CodecError::ArgContainsSpace(arg.to_string()));
            }
            unsigned.push(' ');
            unsigned.push_str(arg);
        }

        let token = if self.config.sign {
            format!("{} {}", self.sign(&unsigned), unsigned)
        } else {
            unsigned
        };

        if token.len() > self.config.max_len {
            return Err(CodecError::TooLong {
                len: token.len(),
                max: self.config.max_len,
            });
        }
        Ok(token)
    }

    /// Splits a token into signature (when signing is on), action and raw args. Does not verify.
    pub fn decode(&self, token: &str) -> Result<DecodedCallback, CodecError> {
        let (signature, payload) = if self.config.sign {
            match token.split_once(' ') {
                Some((sig, rest)) if sig.len() == self.config.sign_length => {
                    (Some(sig.to_string()), rest)
                }
                _ => return Err(CodecError::Malformed(token.to_string())),
            }
        } else {
            (None, token)
        };

        let mut parts = payload.split(' ');
        let action = parts
            .next()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| CodecError::Malformed(token.to_string()))?;

        Ok(DecodedCallback {
            signature,
            action: action.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// Recomputes the signature over the unsigned remainder and compares it to the embedded one.
    /// Always true when signing is off.
    pub fn verify(&self, token: &str) -> bool {
        if !self.config.sign {
            return true;
        }
        match token.split_once(' ') {
            Some((sig, rest)) if sig.len() == self.config.sign_length => {
                constant_time_eq(sig.as_bytes(), self.sign(rest).as_bytes())
            }
            _ => false,
        }
    }
}

impl CallbackVerifier for CallbackCodec {
    fn open(&self, token: &str) -> Result<DecodedCallback, CodecError> {
        let decoded = self.decode(token)?;
        if !self.verify(token) {
            debug!(action = %decoded.action, "callback signature mismatch");
            return Err(CodecError::BadSignature);
        }
        Ok(decoded)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed() -> CallbackCodec {
        CallbackCodec::new(CodecConfig::with_secret("123:secret"))
    }

    #[test]
    fn test_unsigned_encode_joins_with_spaces() {
        let codec = CallbackCodec::new(CodecConfig::unsigned());
        assert_eq!(codec.encode("clicked", &["1", "x"]).unwrap(), "clicked 1 x");
        assert_eq!(codec.encode::<&str>("menu", &[]).unwrap(), "menu");
    }

    #[test]
    fn test_signed_token_layout() {
        let codec = signed();
        let token = codec.encode("clicked", &["1"]).unwrap();
        let (sig, rest) = token.split_once(' ').unwrap();
        assert_eq!(sig.len(), DEFAULT_SIGN_LENGTH);
        assert_eq!(rest, "clicked 1");
        assert_eq!(sig, codec.sign("clicked 1"));
    }

    #[test]
    fn test_sign_is_deterministic_and_keyed() {
        let a = signed();
        let b = CallbackCodec::new(CodecConfig::with_secret("other"));
        assert_eq!(a.sign("openForm"), a.sign("openForm"));
        assert_ne!(a.sign("openForm"), b.sign("openForm"));
    }

    #[test]
    fn test_sign_length_is_configurable_and_clamped() {
        let short = CallbackCodec::new(CodecConfig {
            sign_length: 4,
            ..CodecConfig::with_secret("s")
        });
        assert_eq!(short.sign("x").len(), 4);

        let huge = CallbackCodec::new(CodecConfig {
            sign_length: 500,
            ..CodecConfig::with_secret("s")
        });
        assert_eq!(huge.sign("x").len(), 44);
    }

    #[test]
    fn test_encode_rejects_spaces_and_bad_names() {
        let codec = signed();
        assert_eq!(
            codec.encode("a", &["two words"]),
            Err(CodecError::ArgContainsSpace("two words".to_string()))
        );
        assert_eq!(codec.encode::<&str>("", &[]), Err(CodecError::EmptyAction));
        assert!(matches!(
            codec.encode::<&str>("bad name", &[]),
            Err(CodecError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_encode_enforces_max_len() {
        let codec = CallbackCodec::new(CodecConfig {
            max_len: 16,
            ..CodecConfig::unsigned()
        });
        assert!(codec.encode("abc", &["1234567890"]).is_ok());
        assert_eq!(
            codec.encode("abc", &["12345678901234"]),
            Err(CodecError::TooLong { len: 18, max: 16 })
        );
    }

    #[test]
    fn test_decode_rejects_missing_signature() {
        let codec = signed();
        assert!(matches!(codec.decode("clicked"), Err(CodecError::Malformed(_))));
        assert!(matches!(codec.decode("abc clicked"), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_open_rejects_tampered_args() {
        let codec = signed();
        let token = codec.encode("clicked", &["1"]).unwrap();
        let tampered = token.replace("clicked 1", "clicked 9");
        assert_eq!(codec.open(&tampered), Err(CodecError::BadSignature));
        assert_eq!(codec.open(&token).unwrap().action, "clicked");
    }

    #[test]
    fn test_verify_always_true_when_unsigned() {
        let codec = CallbackCodec::new(CodecConfig::unsigned());
        assert!(codec.verify("anything at all"));
    }
}
