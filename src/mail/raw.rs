use serde::Deserialize;

/// Provider-native message as handed over by a [`MailSource`](super::MailSource).
#[derive(Debug, Clone)]
pub enum RawMessage {
    /// Full RFC 822 bytes from an IMAP `BODY[]` fetch, keyed by UID.
    Rfc822 { id: String, bytes: Vec<u8> },
    /// Gmail REST `messages.get?format=full` resource.
    Api(ApiMessage),
}

impl RawMessage {
    pub fn id(&self) -> &str {
        match self {
            RawMessage::Rfc822 { id, .. } => id,
            RawMessage::Api(msg) => &msg.id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<ApiPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPart {
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<ApiHeader>,
    #[serde(default)]
    pub body: Option<ApiBody>,
    #[serde(default)]
    pub parts: Vec<ApiPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
    /// base64url, padding optional.
    #[serde(default)]
    pub data: Option<String>,
}

impl ApiPart {
    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}
