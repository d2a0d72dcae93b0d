#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use taskpilot_core::*;

    fn sample_task(status: TaskStatus, due_in_hours: Option<i64>) -> Task {
        let now = Utc::now();
        Task {
            id: new_task_id(),
            title: "Write report".into(),
            description: String::new(),
            priority: Priority::Medium,
            status,
            due_date: due_in_hours.map(|h| now + Duration::hours(h)),
            created_at: now,
            updated_at: now,
            tags: vec![],
        }
    }

    // ── Enum tests ─────────────────────────────────────────────

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), json!("in-progress"));
        assert_eq!(serde_json::to_value(TaskStatus::Cancelled).unwrap(), json!("cancelled"));
        assert_eq!(serde_json::to_value(Priority::Urgent).unwrap(), json!("urgent"));
    }

    #[test]
    fn test_status_from_str_is_lenient() {
        assert_eq!("In Progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("done".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert!("blocked".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_priority_defaults_to_medium() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
    }

    #[test]
    fn test_action_kind_names() {
        assert_eq!(ActionKind::CreateTask.to_string(), "create_task");
        assert_eq!("set-reminder".parse::<ActionKind>().unwrap(), ActionKind::SetReminder);
        assert!("archive_task".parse::<ActionKind>().is_err());
    }

    // ── Task tests ─────────────────────────────────────────────

    #[test]
    fn test_task_serializes_camel_case() {
        let mut task = sample_task(TaskStatus::Pending, Some(2));
        task.tags = vec!["work".into(), "work".into()];
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("dueDate").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
        assert_eq!(value["tags"], json!(["work", "work"]));
    }

    #[test]
    fn test_task_without_due_date_omits_field() {
        let task = sample_task(TaskStatus::Pending, None);
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("dueDate").is_none());
    }

    #[test]
    fn test_overdue_requires_past_due_and_not_completed() {
        let now = Utc::now();
        assert!(sample_task(TaskStatus::Pending, Some(-1)).is_overdue(now));
        assert!(!sample_task(TaskStatus::Completed, Some(-1)).is_overdue(now));
        assert!(!sample_task(TaskStatus::Pending, None).is_overdue(now));
        assert!(!sample_task(TaskStatus::Pending, Some(3)).is_overdue(now));
    }

    #[test]
    fn test_advance_timestamp_is_strict() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert!(advance_timestamp(t, t) > t);
        assert!(advance_timestamp(t, t - Duration::seconds(5)) > t);
        assert_eq!(advance_timestamp(t, t + Duration::seconds(5)), t + Duration::seconds(5));
    }

    #[test]
    fn test_task_ids_are_prefixed_and_unique() {
        let a = new_task_id();
        let b = new_task_id();
        assert!(a.starts_with("task_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_task_update_is_empty() {
        assert!(TaskUpdate::default().is_empty());
        let update = TaskUpdate {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    // ── Search criteria ────────────────────────────────────────

    #[test]
    fn test_empty_criteria_match_everything() {
        let criteria = SearchCriteria::default();
        assert!(criteria.is_empty());
        assert!(criteria.matches(&sample_task(TaskStatus::Cancelled, None)));
    }

    #[test]
    fn test_criteria_compose_with_and() {
        let mut task = sample_task(TaskStatus::Pending, None);
        task.priority = Priority::High;
        task.tags = vec!["home".into()];
        task.description = "Quarterly NUMBERS".into();

        let criteria = SearchCriteria {
            status: Some(TaskStatus::Pending),
            priority: Some(Priority::High),
            tags: vec!["office".into(), "home".into()],
            search: Some("numbers".into()),
        };
        assert!(criteria.matches(&task));

        let wrong_priority = SearchCriteria {
            priority: Some(Priority::Low),
            ..criteria.clone()
        };
        assert!(!wrong_priority.matches(&task));

        let wrong_tags = SearchCriteria {
            tags: vec!["garden".into()],
            ..criteria
        };
        assert!(!wrong_tags.matches(&task));
    }

    // ── Users ──────────────────────────────────────────────────

    #[test]
    fn test_user_draft_defaults() {
        let user = UserDraft::default().into_user();
        assert!(user.id.starts_with("user_"));
        assert_eq!(user.name, "Anonymous User");
        assert_eq!(user.preferences.timezone, "UTC");
        assert_eq!(user.preferences.notification_channels, vec!["email", "push"]);
    }

    #[test]
    fn test_user_draft_keeps_given_fields() {
        let draft: UserDraft = serde_json::from_value(json!({
            "id": "user_42",
            "name": "Sam",
            "preferences": { "timezone": "Europe/Berlin" }
        }))
        .unwrap();
        let user = draft.into_user();
        assert_eq!(user.id, "user_42");
        assert_eq!(user.name, "Sam");
        assert_eq!(user.preferences.timezone, "Europe/Berlin");
        assert_eq!(user.preferences.notification_channels.len(), 2);
    }

    // ── Agent state ────────────────────────────────────────────

    #[test]
    fn test_agent_state_defaults() {
        let state = AgentState::default();
        assert_eq!(state.preferences.reminder_intervals, vec![1, 24, 168]);
        assert_eq!(state.preferences.working_hours, WorkingHours { start: 9, end: 17 });
        assert!(state.chat_history.is_empty());
    }

    #[test]
    fn test_agent_state_loads_partial_snapshot() {
        let state: AgentState = serde_json::from_value(json!({ "tasks": [] })).unwrap();
        assert!(state.users.is_empty());
        assert_eq!(state.preferences.reminder_intervals.len(), 3);
    }

    #[test]
    fn test_recent_messages_window() {
        let mut state = AgentState::default();
        for i in 0..25 {
            state.chat_history.push(ChatMessage::user("u1", format!("m{i}")));
        }
        let recent = state.recent_messages(20);
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[19].content, "m24");
        assert_eq!(state.recent_messages(100).len(), 25);
    }

    #[test]
    fn test_recent_messages_from_filters_author_and_kind() {
        let mut state = AgentState::default();
        state.chat_history.push(ChatMessage::user("u1", "first"));
        state.chat_history.push(ChatMessage::user("u2", "other"));
        state.chat_history.push(ChatMessage::agent("u1", "reply", None));
        state.chat_history.push(ChatMessage::user("u1", "second"));
        let msgs = state.recent_messages_from("u1", 5);
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn test_chat_message_type_field() {
        let msg = ChatMessage::system("Reminder", None);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "system");
        assert_eq!(value["userId"], SYSTEM_USER_ID);
        assert!(value.get("metadata").is_none());
    }

    // ── Analytics ──────────────────────────────────────────────

    #[test]
    fn test_productivity_score_empty() {
        let a = Analytics::compute(&[], Utc::now());
        assert_eq!(a.total_tasks, 0);
        assert_eq!(a.productivity_score, 0);
    }

    #[test]
    fn test_productivity_score_rounds() {
        let tasks = vec![
            sample_task(TaskStatus::Completed, None),
            sample_task(TaskStatus::Completed, None),
            sample_task(TaskStatus::Completed, None),
            sample_task(TaskStatus::Pending, None),
        ];
        let a = Analytics::compute(&tasks, Utc::now());
        assert_eq!(a.productivity_score, 75);
        assert_eq!(a.completed_tasks, 3);
        assert_eq!(a.pending_tasks, 1);

        let thirds = vec![
            sample_task(TaskStatus::Completed, None),
            sample_task(TaskStatus::InProgress, None),
            sample_task(TaskStatus::Cancelled, None),
        ];
        assert_eq!(Analytics::compute(&thirds, Utc::now()).productivity_score, 33);
    }

    #[test]
    fn test_overdue_count_excludes_completed_and_undated() {
        let tasks = vec![
            sample_task(TaskStatus::Pending, Some(-5)),
            sample_task(TaskStatus::Completed, Some(-5)),
            sample_task(TaskStatus::Pending, None),
        ];
        let a = Analytics::compute(&tasks, Utc::now());
        assert_eq!(a.overdue_tasks, 1);
        let value = serde_json::to_value(a).unwrap();
        assert_eq!(value["overdueTasks"], 1);
        assert_eq!(value["productivityScore"], 33);
    }

    // ── Frames ─────────────────────────────────────────────────

    #[test]
    fn test_parse_chat_frame() {
        let frame = ClientFrame::parse(r#"{"type":"chat_message","content":"hi","userId":"u1"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::ChatMessage {
                user_id: Some("u1".into()),
                content: "hi".into()
            }
        );
    }

    #[test]
    fn test_parse_update_frame() {
        let frame = ClientFrame::parse(
            r#"{"type":"update_task","taskId":"task_1","updates":{"status":"completed"}}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::UpdateTask { task_id, updates } => {
                assert_eq!(task_id, "task_1");
                assert_eq!(updates.status, Some(TaskStatus::Completed));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_parse_get_tasks_without_criteria() {
        let frame = ClientFrame::parse(r#"{"type":"get_tasks"}"#).unwrap();
        assert_eq!(frame, ClientFrame::GetTasks { criteria: SearchCriteria::default() });
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        assert!(matches!(
            ClientFrame::parse("not json"),
            Err(TaskPilotError::InvalidFrame(_))
        ));
        assert!(matches!(
            ClientFrame::parse(r#"{"type":"launch_rocket"}"#),
            Err(TaskPilotError::InvalidFrame(_))
        ));
        assert!(ClientFrame::parse(r#"{"type":"delete_task"}"#).is_err());
    }

    #[test]
    fn test_server_event_shape() {
        let event = ServerEvent::TaskDeleted {
            task_id: "task_1".into(),
            success: Some(true),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "task_deleted");
        assert_eq!(value["taskId"], "task_1");
        assert_eq!(value["success"], true);
        assert_eq!(event.kind(), "task_deleted");
    }

    #[test]
    fn test_connection_established_shape() {
        let event = ServerEvent::ConnectionEstablished {
            recent_messages: vec![],
            task_count: 4,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "connection_established");
        assert_eq!(value["taskCount"], 4);
        assert_eq!(value["recentMessages"], json!([]));
    }

    #[test]
    fn test_task_updated_null() {
        let value = serde_json::to_value(ServerEvent::TaskUpdated { task: None }).unwrap();
        assert_eq!(value, json!({"type": "task_updated", "task": null}));
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_display() {
        let err = TaskPilotError::RateLimited { retry_after_secs: 30 };
        assert!(err.to_string().contains("30"));
        let err = TaskPilotError::ConfigValidation {
            field: "agent.temperature".into(),
            reason: "out of range".into(),
        };
        assert!(err.to_string().contains("agent.temperature"));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<Task>("{").unwrap_err();
        let err: TaskPilotError = serde_err.into();
        assert!(matches!(err, TaskPilotError::Serialization(_)));
    }
}
