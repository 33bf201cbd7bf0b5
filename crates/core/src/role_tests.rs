// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::identity::ParsedIdentity;

fn rigs() -> RigsConfig {
    RigsConfig::from_json(r#"{"rigs":{"gastown":{}}}"#).unwrap()
}

#[yare::parameterized(
    mayor    = { "mayor",                "/town/mayor" },
    deacon   = { "deacon",               "/town/deacon" },
    witness  = { "gastown/witness",      "/town/gastown/witness" },
    refinery = { "gastown/refinery",     "/town/gastown/refinery" },
    crew     = { "gastown/crew/joe",     "/town/gastown/crew/joe" },
    polecat  = { "gastown/polecat/slit", "/town/gastown/polecats/slit/gastown" },
)]
fn work_dirs(identity: &str, expected: &str) {
    let id = ParsedIdentity::parse_slashed(identity).unwrap();
    assert_eq!(id.work_dir(Path::new("/town"), &rigs()), PathBuf::from(expected));
}

#[test]
fn work_dir_honors_rig_path_override() {
    let rigs = RigsConfig::from_json(r#"{"rigs":{"gastown":{"path":"clones/gt"}}}"#).unwrap();
    let id = ParsedIdentity::parse_slashed("gastown/witness").unwrap();
    assert_eq!(id.work_dir(Path::new("/town"), &rigs), PathBuf::from("/town/clones/gt/witness"));
}

#[test]
fn start_command_without_beacon_is_bare_runtime() {
    let id = ParsedIdentity::parse_slashed("mayor").unwrap();
    assert_eq!(id.start_command("claude", None), "claude");
}

#[test]
fn start_command_embeds_escaped_beacon() {
    let id = ParsedIdentity::parse_slashed("gastown/witness").unwrap();
    let beacon = Beacon::new("daemon", "gastown/witness", "recovery \"quoted\" $HOME");
    let command = id.start_command("claude", Some(&beacon));
    assert!(command.starts_with("claude \""));
    assert!(command.contains("\\\"quoted\\\""));
    assert!(command.contains("\\$HOME"));
}

#[test]
fn session_env_carries_all_four_variables() {
    let id = ParsedIdentity::parse_slashed("gastown/polecat/slit").unwrap();
    let env = id.session_env(Path::new("/town"));
    assert!(env.contains(&(ENV_ROLE.to_string(), "polecat".to_string())));
    assert!(env.contains(&(ENV_RIG.to_string(), "gastown".to_string())));
    assert!(env.contains(&(ENV_AGENT.to_string(), "slit".to_string())));
    assert!(env.contains(&(ENV_TOWN_ROOT.to_string(), "/town".to_string())));
}

#[test]
fn town_roles_have_empty_rig_and_agent_env() {
    let id = ParsedIdentity::parse_slashed("deacon").unwrap();
    let env = id.session_env(Path::new("/town"));
    assert!(env.contains(&(ENV_RIG.to_string(), String::new())));
    assert!(env.contains(&(ENV_AGENT.to_string(), String::new())));
}

#[test]
fn pre_sync_roles() {
    assert!(!RoleSpec::of(RoleType::Mayor).needs_pre_sync);
    assert!(!RoleSpec::of(RoleType::Witness).needs_pre_sync);
    assert!(RoleSpec::of(RoleType::Refinery).needs_pre_sync);
    assert!(RoleSpec::of(RoleType::Polecat).needs_pre_sync);
}

#[test]
fn each_role_has_a_distinct_theme() {
    let styles: Vec<&str> = [
        RoleType::Mayor,
        RoleType::Deacon,
        RoleType::Witness,
        RoleType::Refinery,
        RoleType::Crew,
        RoleType::Polecat,
    ]
    .iter()
    .map(|r| RoleSpec::of(*r).theme.status_style)
    .collect();
    let mut unique = styles.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), styles.len());
}
