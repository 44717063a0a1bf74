use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;

/// Role of a message within a conversation transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = crate::TicketRagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(crate::TicketRagError::Config(format!(
                "invalid message role: {other}"
            ))),
        }
    }
}

/// A conversation owned by exactly one user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable transcript entry; append-only per conversation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Structured metadata carried by every indexed ticket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketMetadata {
    pub ticket_id: String,
    pub issue_type: String,
    pub priority: String,
    pub status: String,
}

/// A historical ticket returned by vector search, ordered by ascending distance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDocument {
    pub text: String,
    pub metadata: TicketMetadata,
    /// Vector distance as reported by the index; `None` when the index omits it
    pub distance: Option<f32>,
}

impl TicketDocument {
    /// Similarity score derived from distance (`1 - distance`), if known
    pub fn score(&self) -> Option<f32> {
        self.distance.map(|d| 1.0 - d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_round_trip() {
        assert_eq!("user".parse::<MessageRole>().unwrap(), MessageRole::User);
        assert_eq!(
            "assistant".parse::<MessageRole>().unwrap(),
            MessageRole::Assistant
        );
        assert!("system".parse::<MessageRole>().is_err());
        assert_eq!(MessageRole::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_document_score_from_distance() {
        let doc = TicketDocument {
            text: "ticket".to_string(),
            metadata: TicketMetadata::default(),
            distance: Some(0.1),
        };
        assert!((doc.score().unwrap() - 0.9).abs() < f32::EPSILON);

        let unknown = TicketDocument {
            text: "ticket".to_string(),
            metadata: TicketMetadata::default(),
            distance: None,
        };
        assert!(unknown.score().is_none());
    }
}
