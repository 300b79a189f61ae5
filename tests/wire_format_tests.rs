use lingua_sync::nats::{ChangeMessage, ChangeType};
use lingua_sync::speech::{reduce_feedback, RecognitionResult};
use lingua_sync::{Message, MessageKind, Session, SessionStatus, Topic};

#[test]
fn test_change_message_serialization() {
    let msg = ChangeMessage::insert(
        "messages",
        serde_json::json!({"id": "m-1", "content": "Hola"}),
    );

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"eventType\":\"INSERT\""));
    assert!(json.contains("\"table\":\"messages\""));
    assert!(!json.contains("\"old\""));

    let deserialized: ChangeMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.event_type, ChangeType::Insert);
    assert_eq!(deserialized.record(), msg.new.as_ref());
}

#[test]
fn test_delete_change_carries_old_row() {
    let json = r#"{
        "table": "message_feedback",
        "eventType": "DELETE",
        "old": {"message_id": "m-1"},
        "commit_timestamp": "2025-10-27T14:30:05Z"
    }"#;

    let msg: ChangeMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.event_type, ChangeType::Delete);
    assert!(msg.new.is_none());
    assert_eq!(msg.record().unwrap()["message_id"], "m-1");
}

#[test]
fn test_message_row_with_embedded_feedback() {
    let json = r#"{
        "id": "m-1",
        "session_id": "s-1",
        "user_id": "00000000-0000-0000-0000-000000000000",
        "content": "¿Cómo estás?",
        "type": "audio",
        "translation": "How are you?",
        "sequence_number": 4,
        "created_at": "2025-10-27T14:30:00Z",
        "message_feedback": {
            "pronunciation_score": 88.5,
            "accuracy_score": 90,
            "fluency_score": 80,
            "completeness_score": 100
        }
    }"#;

    let message: Message = serde_json::from_str(json).unwrap();
    assert_eq!(message.kind, MessageKind::Audio);
    assert_eq!(message.sequence_number, 4);
    assert!(message.is_from_assistant());
    assert_eq!(message.feedback.unwrap().pronunciation_score, 88.5);
}

#[test]
fn test_message_row_without_feedback() {
    let json = r#"{
        "id": "m-2",
        "session_id": "s-1",
        "user_id": "learner-1",
        "content": "Bien",
        "type": "text",
        "sequence_number": 5,
        "created_at": "2025-10-27T14:31:00Z",
        "message_feedback": null
    }"#;

    let message: Message = serde_json::from_str(json).unwrap();
    assert!(message.feedback.is_none());
    assert!(message.translation.is_none());
    assert!(!message.is_from_assistant());
}

#[test]
fn test_session_row() {
    let json = r#"{
        "id": "s-1",
        "user_id": "learner-1",
        "title": "New Chat Session",
        "language": "fr",
        "level": "intermediate",
        "status": "archived",
        "last_message_at": "2025-10-27T14:30:00Z",
        "last_accessed_at": "2025-10-27T14:35:00Z",
        "created_at": "2025-10-27T14:00:00Z"
    }"#;

    let session: Session = serde_json::from_str(json).unwrap();
    assert_eq!(session.status, SessionStatus::Archived);
    assert_eq!(session.owner_id.as_str(), "learner-1");
}

#[test]
fn test_recognition_result_feedback() {
    let json = r#"{
        "NBest": [
            {
                "Display": "Hola.",
                "PronunciationAssessment": {
                    "AccuracyScore": 95,
                    "FluencyScore": 90,
                    "CompletenessScore": 100,
                    "PronScore": 93.4
                }
            },
            {
                "Display": "Ola.",
                "PronunciationAssessment": {
                    "AccuracyScore": 40,
                    "FluencyScore": 90,
                    "CompletenessScore": 100,
                    "PronScore": 60
                }
            }
        ]
    }"#;

    let result: RecognitionResult = serde_json::from_str(json).unwrap();
    let feedback = reduce_feedback(&[result]).unwrap();
    assert_eq!(feedback.pronunciation_score, 93.4);
    assert_eq!(feedback.accuracy_score, 95.0);
}

#[test]
fn test_topic_subjects() {
    let topic = Topic::Messages("s-1".into());
    assert_eq!(topic.subject("lingua"), "lingua.messages.s-1");
    assert_eq!(topic.to_string(), "messages:s-1");

    let topic = Topic::Sessions("learner-1".into());
    assert_eq!(topic.subject("lingua"), "lingua.sessions.learner-1");
}
