// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn bead(role: RoleType, rig: Option<&str>, name: Option<&str>) -> AgentBead {
    AgentBead {
        id: "gt-gastown-polecat-slit".to_string(),
        role_type: role,
        rig: rig.map(String::from),
        agent_name: name.map(String::from),
        agent_state: String::new(),
        hook_bead: String::new(),
        updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap(),
    }
}

#[test]
fn serde_roundtrip() {
    let mut record = bead(RoleType::Polecat, Some("gastown"), Some("slit"));
    record.agent_state = agent_state::SPAWNING.to_string();
    record.hook_bead = "gt-abc".to_string();

    let json = serde_json::to_string(&record).unwrap();
    let restored: AgentBead = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.id, "gt-gastown-polecat-slit");
    assert_eq!(restored.role_type, RoleType::Polecat);
    assert_eq!(restored.rig.as_deref(), Some("gastown"));
    assert_eq!(restored.agent_name.as_deref(), Some("slit"));
    assert_eq!(restored.agent_state, "spawning");
    assert_eq!(restored.hook_bead, "gt-abc");
    assert_eq!(restored.updated_at, record.updated_at);
}

#[test]
fn missing_optional_fields_default() {
    let json = r#"{
        "id": "gt-mayor",
        "role_type": "mayor",
        "updated_at": "2026-01-01T00:00:00Z"
    }"#;
    let restored: AgentBead = serde_json::from_str(json).unwrap();
    assert!(restored.rig.is_none());
    assert!(restored.agent_state.is_empty());
    assert!(!restored.has_hook());
}

#[test]
fn has_hook_iff_hook_bead_nonempty() {
    let mut record = bead(RoleType::Polecat, Some("gastown"), Some("slit"));
    assert!(!record.has_hook());
    record.hook_bead = "gt-123".to_string();
    assert!(record.has_hook());
}

#[test]
fn identity_reconstructs() {
    let record = bead(RoleType::Polecat, Some("gastown"), Some("slit"));
    let id = record.identity().unwrap();
    assert_eq!(id.session_name("gt"), "gt-gastown-slit");
}

#[test]
fn identity_rejects_invalid_shape() {
    let record = bead(RoleType::Witness, None, None);
    assert!(record.identity().is_err());
}
