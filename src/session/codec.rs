//! Session codec
//!
//! Converts a [`SessionState`] to and from its transport string. New writes always
//! use the JSON envelope; reads also accept the pipe- and space-delimited formats
//! written by older releases so that upgrading doesn't log everyone out.
//!
//! Decoding is an ordered chain of speculative parse attempts. Each attempt only
//! builds a local value, the first structural success wins, and decryption runs
//! once afterwards on whatever the winning attempt produced.

use crate::session::state::SessionState;
use crate::utils::crypto::FieldCipher;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Fields whose decryption failure is tolerated, keeping the stored value.
///
/// Sessions written before identity fields were encrypted carry them in
/// plaintext. Only these two fields get that treatment; tokens are always strict.
pub const BEST_EFFORT_FIELDS: &[&str] = &["email", "user"];

/// Codec failures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The transport string matches none of the known formats
    #[error("invalid session state ({0})")]
    Decode(String),
    /// Encrypting or decrypting a required field failed
    #[error("session field '{field}' crypto failure: {message}")]
    Crypto { field: &'static str, message: String },
    /// JSON serialization failed
    #[error("failed to serialize session state: {0}")]
    Serialize(String),
}

/// How a field reacts to a decryption failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptMode {
    /// Failure aborts the decode
    Strict,
    /// Failure keeps the stored value as plaintext
    BestEffort,
}

impl DecryptMode {
    /// Mode for a named session field
    #[must_use]
    pub fn for_field(field: &str) -> Self {
        if BEST_EFFORT_FIELDS.contains(&field) {
            Self::BestEffort
        } else {
            Self::Strict
        }
    }
}

/// JSON transport envelope
///
/// Key names are the ones existing cookies were written with and must not change.
/// Reads also accept the lower and camel case spellings of each key.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionEnvelope {
    #[serde(
        rename = "AccessToken",
        alias = "accessToken",
        alias = "accesstoken",
        default,
        skip_serializing_if = "Option::is_none",
    )]
    access_token: Option<String>,
    #[serde(
        rename = "IDToken",
        alias = "IdToken",
        alias = "idToken",
        alias = "idtoken",
        default,
        skip_serializing_if = "Option::is_none",
    )]
    id_token: Option<String>,
    #[serde(
        rename = "RefreshToken",
        alias = "refreshToken",
        alias = "refreshtoken",
        default,
        skip_serializing_if = "Option::is_none",
    )]
    refresh_token: Option<String>,
    #[serde(
        rename = "Email",
        alias = "email",
        default,
        skip_serializing_if = "Option::is_none",
    )]
    email: Option<String>,
    #[serde(
        rename = "User",
        alias = "user",
        default,
        skip_serializing_if = "Option::is_none",
    )]
    user: Option<String>,
    #[serde(
        rename = "CreatedAt",
        alias = "createdAt",
        alias = "createdat",
        default,
        skip_serializing_if = "Option::is_none",
    )]
    created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "ExpiresOn",
        alias = "expiresOn",
        alias = "expireson",
        default,
        skip_serializing_if = "Option::is_none",
    )]
    expires_on: Option<DateTime<Utc>>,
}

impl SessionEnvelope {
    fn from_state(state: &SessionState) -> Self {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        Self {
            access_token: non_empty(&state.access_token),
            id_token: non_empty(&state.id_token),
            refresh_token: non_empty(&state.refresh_token),
            email: non_empty(&state.email),
            user: non_empty(&state.user),
            created_at: state.created_at,
            expires_on: state.expires_on,
        }
    }

    /// The embedded record, or `None` when no record field was present at all
    fn into_state(self) -> Option<SessionState> {
        let has_record = self.access_token.is_some()
            || self.id_token.is_some()
            || self.refresh_token.is_some()
            || self.email.is_some()
            || self.user.is_some();
        if !has_record {
            return None;
        }

        let mut state = SessionState {
            access_token: self.access_token.unwrap_or_default(),
            id_token: self.id_token.unwrap_or_default(),
            refresh_token: self.refresh_token.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            user: self.user.unwrap_or_default(),
            ..SessionState::default()
        };
        if let Some(created_at) = self.created_at {
            state.created_at = Some(created_at);
        }
        if let Some(expires_on) = self.expires_on {
            state.expires_on = Some(expires_on);
        }
        Some(state)
    }
}

/// Encode a session into its transport string
///
/// Without a cipher only `email` and `user` are written: tokens are never stored
/// in the clear.
///
/// # Errors
///
/// Returns an error if encrypting any non-empty field fails or serialization fails
pub fn encode_session_state(
    state: &SessionState,
    cipher: Option<&dyn FieldCipher>,
) -> Result<String, CodecError> {
    let sealed = match cipher {
        None => state.reduced(),
        Some(cipher) => {
            let mut sealed = state.clone();
            encrypt_field(cipher, "email", &mut sealed.email)?;
            encrypt_field(cipher, "user", &mut sealed.user)?;
            encrypt_field(cipher, "access_token", &mut sealed.access_token)?;
            encrypt_field(cipher, "id_token", &mut sealed.id_token)?;
            encrypt_field(cipher, "refresh_token", &mut sealed.refresh_token)?;
            sealed
        }
    };

    serde_json::to_string(&SessionEnvelope::from_state(&sealed))
        .map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Decode a transport string back into a session
///
/// # Errors
///
/// Returns an error if the string matches none of the known formats or a
/// strictly decrypted field fails to decrypt
pub fn decode_session_state(
    value: &str,
    cipher: Option<&dyn FieldCipher>,
) -> Result<SessionState, CodecError> {
    let parsed = match parse_json_envelope(value) {
        Some(state) => state,
        None => parse_legacy(value, cipher.is_some())?,
    };

    let mut state = match cipher {
        None => parsed.reduced(),
        Some(cipher) => {
            let mut state = parsed;
            decrypt_field(cipher, "email", &mut state.email)?;
            decrypt_field(cipher, "user", &mut state.user)?;
            decrypt_field(cipher, "access_token", &mut state.access_token)?;
            decrypt_field(cipher, "id_token", &mut state.id_token)?;
            decrypt_field(cipher, "refresh_token", &mut state.refresh_token)?;
            state
        }
    };

    state.normalize_user();
    Ok(state)
}

fn encrypt_field(
    cipher: &dyn FieldCipher,
    field: &'static str,
    value: &mut String,
) -> Result<(), CodecError> {
    if value.is_empty() {
        return Ok(());
    }
    *value = cipher.encrypt(value).map_err(|e| CodecError::Crypto {
        field,
        message: e.to_string(),
    })?;
    Ok(())
}

fn decrypt_field(
    cipher: &dyn FieldCipher,
    field: &'static str,
    value: &mut String,
) -> Result<(), CodecError> {
    if value.is_empty() {
        return Ok(());
    }
    match (cipher.decrypt(value), DecryptMode::for_field(field)) {
        (Ok(plaintext), _) => *value = plaintext,
        (Err(_), DecryptMode::BestEffort) => {
            log::debug!("Session field '{field}' is not encrypted, keeping stored value");
        }
        (Err(e), DecryptMode::Strict) => {
            return Err(CodecError::Crypto {
                field,
                message: e.to_string(),
            });
        }
    }
    Ok(())
}

/// Current format: JSON envelope with an embedded record
fn parse_json_envelope(value: &str) -> Option<SessionState> {
    serde_json::from_str::<SessionEnvelope>(value)
        .ok()
        .and_then(SessionEnvelope::into_state)
}

/// Pipe-delimited format written by the first releases
fn parse_legacy(value: &str, has_cipher: bool) -> Result<SessionState, CodecError> {
    let chunks: Vec<&str> = value.split('|').collect();

    if !has_cipher {
        if chunks.len() != 1 {
            return Err(CodecError::Decode(format!(
                "legacy: expected 1 chunk for plain got {}",
                chunks.len()
            )));
        }
        return parse_legacy_plain(chunks[0]);
    }

    let (plain, access_token, id_token, expires, refresh_token) = match chunks.as_slice() {
        [plain, access, expires, refresh] => (*plain, *access, "", *expires, *refresh),
        [plain, access, id, expires, refresh] => (*plain, *access, *id, *expires, *refresh),
        _ => {
            return Err(CodecError::Decode(format!(
                "legacy: expected 4 or 5 chunks for full got {}",
                chunks.len()
            )))
        }
    };

    let mut state = parse_legacy_plain(plain)?;
    state.access_token = access_token.to_string();
    state.id_token = id_token.to_string();

    let timestamp: i64 = expires
        .parse()
        .map_err(|e| CodecError::Decode(format!("legacy: wrong expiration time: {e}")))?;
    state.expires_on = match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(expires_on) => Some(expires_on),
        _ => {
            return Err(CodecError::Decode(format!(
                "legacy: expiration time out of range: {timestamp}"
            )))
        }
    };
    state.refresh_token = refresh_token.to_string();

    Ok(state)
}

/// `email:<email> user:<user>`
fn parse_legacy_plain(value: &str) -> Result<SessionState, CodecError> {
    let chunks: Vec<&str> = value.split(' ').collect();
    let [email, user] = chunks.as_slice() else {
        return Err(CodecError::Decode(format!(
            "legacy: expected 2 chunks for user/email got {}",
            chunks.len()
        )));
    };

    Ok(SessionState {
        email: strip(email, "email:"),
        user: strip(user, "user:"),
        ..SessionState::default()
    })
}

fn strip(chunk: &str, prefix: &str) -> String {
    chunk.strip_prefix(prefix).unwrap_or(chunk).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock::FailingCipher;
    use crate::utils::crypto::Cipher;
    use chrono::Duration;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn cipher() -> Cipher {
        Cipher::new(SECRET)
    }

    fn sample_session() -> SessionState {
        let now = Utc::now();
        SessionState {
            access_token: "access-token".to_string(),
            id_token: "id-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            email: "user@domain.com".to_string(),
            user: "just-user".to_string(),
            created_at: Some(now),
            expires_on: Some(now + Duration::hours(1)),
        }
    }

    #[test]
    fn test_round_trip_with_cipher() {
        let c = cipher();
        let session = sample_session();

        let encoded = encode_session_state(&session, Some(&c)).unwrap();
        let decoded = decode_session_state(&encoded, Some(&c)).unwrap();

        assert_eq!(decoded, session);
    }

    #[test]
    fn test_round_trip_defaults_user_to_email() {
        let c = cipher();
        let session = SessionState {
            user: String::new(),
            ..sample_session()
        };

        let encoded = encode_session_state(&session, Some(&c)).unwrap();
        let decoded = decode_session_state(&encoded, Some(&c)).unwrap();

        assert_eq!(decoded.user, "user@domain.com");
        assert_eq!(decoded.access_token, session.access_token);
        assert_eq!(decoded.expires_on, session.expires_on);
    }

    #[test]
    fn test_encode_encrypts_every_field() {
        let c = cipher();
        let encoded = encode_session_state(&sample_session(), Some(&c)).unwrap();

        for plaintext in ["access-token", "id-token", "refresh-token", "user@domain.com", "just-user"] {
            assert!(!encoded.contains(plaintext), "{plaintext} leaked into {encoded}");
        }
        assert!(encoded.contains("\"CreatedAt\""));
        assert!(encoded.contains("\"ExpiresOn\""));
    }

    #[test]
    fn test_encode_without_cipher_keeps_identity_only() {
        let encoded = encode_session_state(&sample_session(), None).unwrap();

        assert_eq!(encoded, r#"{"Email":"user@domain.com","User":"just-user"}"#);
    }

    #[test]
    fn test_round_trip_without_cipher_reduces_record() {
        let encoded = encode_session_state(&sample_session(), None).unwrap();
        let decoded = decode_session_state(&encoded, None).unwrap();

        assert_eq!(
            decoded,
            SessionState {
                email: "user@domain.com".to_string(),
                user: "just-user".to_string(),
                ..SessionState::default()
            }
        );
    }

    #[test]
    fn test_encode_omits_unset_timestamps_and_empty_fields() {
        let session = SessionState {
            email: "a@x.com".to_string(),
            access_token: "token".to_string(),
            ..SessionState::default()
        };
        let encoded = encode_session_state(&session, Some(&cipher())).unwrap();

        assert!(!encoded.contains("CreatedAt"));
        assert!(!encoded.contains("ExpiresOn"));
        assert!(!encoded.contains("IDToken"));
        assert!(!encoded.contains("RefreshToken"));
        assert!(!encoded.contains("\"User\""));
    }

    #[test]
    fn test_encode_failure_aborts() {
        let result = encode_session_state(&sample_session(), Some(&FailingCipher));

        assert!(matches!(result, Err(CodecError::Crypto { field: "email", .. })));
    }

    #[test]
    fn test_decode_json_without_cipher_drops_tokens() {
        let value = r#"{"AccessToken":"a","RefreshToken":"r","Email":"a@x.com","ExpiresOn":"2024-01-01T00:00:00Z"}"#;
        let decoded = decode_session_state(value, None).unwrap();

        assert_eq!(decoded.email, "a@x.com");
        assert_eq!(decoded.user, "a@x.com");
        assert!(decoded.access_token.is_empty());
        assert!(decoded.refresh_token.is_empty());
        assert!(decoded.expires_on.is_none());
    }

    #[test]
    fn test_decode_json_with_offset_timestamp() {
        let c = cipher();
        let value = format!(
            r#"{{"AccessToken":"{}","Email":"a@x.com","ExpiresOn":"2024-01-01T02:00:00.5+02:00"}}"#,
            c.encrypt("token").unwrap()
        );
        let decoded = decode_session_state(&value, Some(&c)).unwrap();

        assert_eq!(decoded.access_token, "token");
        assert_eq!(
            decoded.expires_on.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00.500+00:00"
        );
    }

    #[test]
    fn test_decode_json_lowercase_keys() {
        let c = cipher();
        let value = format!(
            r#"{{"accessToken":"{}","email":"a@x.com","expireson":"2024-01-01T10:00:00Z"}}"#,
            c.encrypt("token").unwrap()
        );
        let decoded = decode_session_state(&value, Some(&c)).unwrap();

        assert_eq!(decoded.access_token, "token");
        assert_eq!(decoded.email, "a@x.com");
        assert_eq!(decoded.user, "a@x.com");
        assert_eq!(
            decoded.expires_on.map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-01-01T10:00:00+00:00")
        );
    }

    #[test]
    fn test_decode_legacy_plain() {
        let decoded = decode_session_state("email:a@x.com user:a@x.com", None).unwrap();

        assert_eq!(
            decoded,
            SessionState {
                email: "a@x.com".to_string(),
                user: "a@x.com".to_string(),
                ..SessionState::default()
            }
        );
    }

    #[test]
    fn test_decode_legacy_plain_wrong_chunk_count() {
        let err = decode_session_state("email:a@x.com", None).unwrap_err();
        assert!(err.to_string().contains("expected 2 chunks"));

        let err = decode_session_state("email:a@x.com user:a extra", None).unwrap_err();
        assert!(err.to_string().contains("expected 2 chunks"));
    }

    #[test]
    fn test_decode_legacy_pipe_without_cipher_rejected() {
        let err = decode_session_state("email:a@x.com user:a@x.com|ATOKEN|1700000000|RTOKEN", None)
            .unwrap_err();

        assert!(err.to_string().contains("expected 1 chunk for plain got 4"));
    }

    #[test]
    fn test_decode_legacy_four_chunks() {
        let c = cipher();
        let value = format!(
            "email:a@x.com user:a@x.com|{}|1700000000|{}",
            c.encrypt("ATOKEN").unwrap(),
            c.encrypt("RTOKEN").unwrap()
        );
        let decoded = decode_session_state(&value, Some(&c)).unwrap();

        assert_eq!(decoded.email, "a@x.com");
        assert_eq!(decoded.user, "a@x.com");
        assert_eq!(decoded.access_token, "ATOKEN");
        assert_eq!(decoded.refresh_token, "RTOKEN");
        assert!(decoded.id_token.is_empty());
        assert_eq!(decoded.expires_on, Utc.timestamp_opt(1_700_000_000, 0).single());
    }

    #[test]
    fn test_decode_legacy_five_chunks_with_empty_refresh() {
        let c = cipher();
        let value = format!(
            "email:a@x.com user:someone|{}|{}|1700000000|",
            c.encrypt("ATOKEN").unwrap(),
            c.encrypt("IDTOKEN").unwrap()
        );
        let decoded = decode_session_state(&value, Some(&c)).unwrap();

        assert_eq!(decoded.user, "someone");
        assert_eq!(decoded.access_token, "ATOKEN");
        assert_eq!(decoded.id_token, "IDTOKEN");
        assert!(decoded.refresh_token.is_empty());
    }

    #[test]
    fn test_decode_legacy_bad_expiry() {
        let c = cipher();
        let value = format!(
            "email:a@x.com user:a@x.com|{}|tomorrow|",
            c.encrypt("ATOKEN").unwrap()
        );
        let err = decode_session_state(&value, Some(&c)).unwrap_err();

        assert!(err.to_string().contains("wrong expiration time"));
    }

    #[test]
    fn test_decode_legacy_wrong_chunk_count_with_cipher() {
        let err = decode_session_state("a|b|c", Some(&cipher())).unwrap_err();
        assert!(err.to_string().contains("expected 4 or 5 chunks for full got 3"));

        let err = decode_session_state("a|b|c|d|e|f", Some(&cipher())).unwrap_err();
        assert!(err.to_string().contains("got 6"));
    }

    #[test]
    fn test_decode_unencrypted_tokens_fail_strictly() {
        let value = "email:a@x.com user:a@x.com|ATOKEN|1700000000|RTOKEN";
        let err = decode_session_state(value, Some(&cipher())).unwrap_err();

        assert!(matches!(err, CodecError::Crypto { field: "access_token", .. }));
    }

    #[test]
    fn test_decode_tolerates_plaintext_identity() {
        let c = cipher();
        let value = format!(
            r#"{{"AccessToken":"{}","Email":"plain@x.com","User":"plain-user"}}"#,
            c.encrypt("token").unwrap()
        );
        let decoded = decode_session_state(&value, Some(&c)).unwrap();

        assert_eq!(decoded.email, "plain@x.com");
        assert_eq!(decoded.user, "plain-user");
        assert_eq!(decoded.access_token, "token");
    }

    #[test]
    fn test_decode_empty_json_object_falls_through() {
        assert!(decode_session_state("{}", Some(&cipher())).is_err());

        // An object with no record fields is not a session; the legacy plain
        // parser then sees a single chunk without a space.
        let err = decode_session_state(r#"{"ExpiresOn":"2024-01-01T00:00:00Z"}"#, None).unwrap_err();
        assert!(err.to_string().contains("expected 2 chunks"));
    }

    #[test]
    fn test_decrypt_mode_for_fields() {
        assert_eq!(DecryptMode::for_field("email"), DecryptMode::BestEffort);
        assert_eq!(DecryptMode::for_field("user"), DecryptMode::BestEffort);
        assert_eq!(DecryptMode::for_field("access_token"), DecryptMode::Strict);
        assert_eq!(DecryptMode::for_field("id_token"), DecryptMode::Strict);
        assert_eq!(DecryptMode::for_field("refresh_token"), DecryptMode::Strict);
    }
}
