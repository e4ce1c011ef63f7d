//! Room authorization predicates. The evaluation pipeline resolves the
//! referenced auth state out of the room's state tree and calls
//! [`authorize`] before committing; nothing here reads storage.

use ruma::{CanonicalJsonObject, CanonicalJsonValue};

use super::{Event, event::host_of};
use crate::{Result, err};

/// The auth events relevant to one admission, resolved from the room
/// state at evaluation time: the create event, the effective power
/// levels, the join rules, the sender's member event and (for membership
/// changes) the target's member event.
#[derive(Default)]
pub struct AuthState<'a> {
	pub create: Option<&'a Event>,
	pub power_levels: Option<&'a Event>,
	pub join_rules: Option<&'a Event>,
	pub sender_member: Option<&'a Event>,
	pub target_member: Option<&'a Event>,
}

impl AuthState<'_> {
	fn creator(&self) -> Option<&str> {
		match self.create?.content()?.get("creator") {
			| Some(CanonicalJsonValue::String(creator)) => Some(creator),
			| _ => None,
		}
	}

	fn join_rule(&self) -> &str {
		let rule = self
			.join_rules
			.and_then(Event::content)
			.and_then(|content| content.get("join_rule"));
		match rule {
			| Some(CanonicalJsonValue::String(rule)) => rule,
			// A room without join rules admits nobody new but the creator.
			| _ => "invite",
		}
	}

	fn membership_of(event: Option<&Event>) -> Option<&str> {
		event.and_then(Event::content_membership)
	}

	/// Effective power of a user. Absent a power_levels event the
	/// creator holds 100 and everyone else 0.
	fn power_of(&self, user: &str) -> i64 {
		let Some(content) = self.power_levels.and_then(Event::content) else {
			return if self.creator() == Some(user) { 100 } else { 0 };
		};

		if let Some(CanonicalJsonValue::Object(users)) = content.get("users") {
			if let Some(CanonicalJsonValue::Integer(power)) = users.get(user) {
				return i64::from(*power);
			}
		}

		int_of(content, "users_default", 0)
	}

	/// Power required to send the given event.
	fn required_power(&self, event: &Event) -> i64 {
		let Some(content) = self.power_levels.and_then(Event::content) else {
			return 0;
		};

		let kind = event.kind().unwrap_or_default();
		if let Some(CanonicalJsonValue::Object(events)) = content.get("events") {
			if let Some(CanonicalJsonValue::Integer(power)) = events.get(kind) {
				return i64::from(*power);
			}
		}

		if event.is_state() {
			int_of(content, "state_default", 50)
		} else {
			int_of(content, "events_default", 0)
		}
	}

	fn action_power(&self, action: &str, default: i64) -> i64 {
		self.power_levels
			.and_then(Event::content)
			.map_or(default, |content| int_of(content, action, default))
	}
}

fn int_of(content: &CanonicalJsonObject, key: &str, default: i64) -> i64 {
	match content.get(key) {
		| Some(CanonicalJsonValue::Integer(val)) => i64::from(*val),
		| _ => default,
	}
}

/// Apply the authorization rules for one event against the resolved auth
/// state. A clean return admits the event; any failure is terminal.
pub fn authorize(event: &Event, state: &AuthState<'_>) -> Result {
	let sender = event
		.sender()
		.ok_or_else(|| err!(AuthFailed("event has no sender")))?;

	if event.kind() == Some("m.room.create") {
		return authorize_create(event, state, sender);
	}

	if state.create.is_none() {
		return Err(err!(AuthFailed("room has no m.room.create event")));
	}

	if event.kind() == Some("m.room.member") {
		return authorize_member(event, state, sender);
	}

	if AuthState::membership_of(state.sender_member) != Some("join") {
		return Err(err!(AuthFailed("sender {sender} is not joined to the room")));
	}

	if event.kind() == Some("m.room.redaction") {
		let required = state.action_power("redact", 50);
		if state.power_of(sender) < required {
			return Err(err!(AuthFailed("sender {sender} lacks power {required} to redact")));
		}

		return Ok(());
	}

	let required = state.required_power(event);
	if state.power_of(sender) < required {
		return Err(err!(AuthFailed(
			"sender {sender} lacks power {required} for {:?}",
			event.kind().unwrap_or_default()
		)));
	}

	Ok(())
}

fn authorize_create(event: &Event, state: &AuthState<'_>, sender: &str) -> Result {
	if state.create.is_some() {
		return Err(err!(AuthFailed("room already has an m.room.create event")));
	}

	if event.prev_events().next().is_some() {
		return Err(err!(AuthFailed("m.room.create cannot reference prior events")));
	}

	let room_host = event.room_id().and_then(host_of);
	if room_host != host_of(sender) {
		return Err(err!(AuthFailed("room and creator must share a host")));
	}

	Ok(())
}

fn authorize_member(event: &Event, state: &AuthState<'_>, sender: &str) -> Result {
	let target = event
		.state_key()
		.ok_or_else(|| err!(AuthFailed("membership event has no state_key")))?;

	let membership = event
		.content_membership()
		.ok_or_else(|| err!(AuthFailed("membership event has no content.membership")))?;

	let prior_target = AuthState::membership_of(state.target_member);
	let sender_joined = AuthState::membership_of(state.sender_member) == Some("join");

	match membership {
		| "join" => {
			if sender != target {
				return Err(err!(AuthFailed("cannot join on behalf of {target}")));
			}

			if prior_target == Some("ban") {
				return Err(err!(AuthFailed("{target} is banned from the room")));
			}

			let first_join = state.creator() == Some(sender) && prior_target.is_none();
			let invited = matches!(prior_target, Some("invite" | "join"));
			if first_join || invited || state.join_rule() == "public" {
				Ok(())
			} else {
				Err(err!(AuthFailed("{target} may not join without an invite")))
			}
		},
		| "invite" => {
			if !sender_joined {
				return Err(err!(AuthFailed("inviter {sender} is not joined")));
			}

			if prior_target == Some("ban") {
				return Err(err!(AuthFailed("{target} is banned from the room")));
			}

			let required = state.action_power("invite", 0);
			if state.power_of(sender) < required {
				return Err(err!(AuthFailed("sender {sender} lacks power to invite")));
			}

			Ok(())
		},
		| "leave" => {
			if sender == target {
				return Ok(());
			}

			if !sender_joined {
				return Err(err!(AuthFailed("sender {sender} is not joined")));
			}

			let required = state.action_power("kick", 50);
			if state.power_of(sender) < required
				|| state.power_of(sender) <= state.power_of(target)
			{
				return Err(err!(AuthFailed("sender {sender} lacks power to kick {target}")));
			}

			Ok(())
		},
		| "ban" => {
			if !sender_joined {
				return Err(err!(AuthFailed("sender {sender} is not joined")));
			}

			let required = state.action_power("ban", 50);
			if state.power_of(sender) < required
				|| state.power_of(sender) <= state.power_of(target)
			{
				return Err(err!(AuthFailed("sender {sender} lacks power to ban {target}")));
			}

			Ok(())
		},
		| other => Err(err!(AuthFailed("unrecognized membership {other:?}"))),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::{AuthState, authorize};
	use crate::matrix::Event;

	fn event(value: serde_json::Value) -> Event {
		Event::from_slice(&serde_json::to_vec(&value).unwrap()).unwrap()
	}

	fn create() -> Event {
		event(json!({
			"type": "m.room.create",
			"room_id": "!room:a.example",
			"sender": "@creator:a.example",
			"content": { "creator": "@creator:a.example" },
		}))
	}

	fn member(user: &str, membership: &str) -> Event {
		event(json!({
			"type": "m.room.member",
			"room_id": "!room:a.example",
			"sender": user,
			"state_key": user,
			"content": { "membership": membership },
		}))
	}

	#[test]
	fn create_must_be_first() {
		let create = create();
		assert!(authorize(&create, &AuthState::default()).is_ok());

		let state = AuthState { create: Some(&create), ..Default::default() };
		assert!(authorize(&create, &state).is_err());
	}

	#[test]
	fn create_host_must_match_sender() {
		let foreign = event(json!({
			"type": "m.room.create",
			"room_id": "!room:b.example",
			"sender": "@creator:a.example",
			"content": { "creator": "@creator:a.example" },
		}));

		assert!(authorize(&foreign, &AuthState::default()).is_err());
	}

	#[test]
	fn creator_joins_first() {
		let create = create();
		let join = member("@creator:a.example", "join");
		let state = AuthState { create: Some(&create), ..Default::default() };

		assert!(authorize(&join, &state).is_ok());
	}

	#[test]
	fn stranger_needs_invite_or_public_rule() {
		let create = create();
		let join = member("@stranger:b.example", "join");
		let state = AuthState { create: Some(&create), ..Default::default() };
		assert!(authorize(&join, &state).is_err());

		let rules = event(json!({
			"type": "m.room.join_rules",
			"room_id": "!room:a.example",
			"sender": "@creator:a.example",
			"state_key": "",
			"content": { "join_rule": "public" },
		}));

		let state = AuthState {
			create: Some(&create),
			join_rules: Some(&rules),
			..Default::default()
		};
		assert!(authorize(&join, &state).is_ok());
	}

	#[test]
	fn invited_user_may_join() {
		let create = create();
		let invite = event(json!({
			"type": "m.room.member",
			"room_id": "!room:a.example",
			"sender": "@creator:a.example",
			"state_key": "@guest:b.example",
			"content": { "membership": "invite" },
		}));

		let join = member("@guest:b.example", "join");
		let state = AuthState {
			create: Some(&create),
			target_member: Some(&invite),
			..Default::default()
		};

		assert!(authorize(&join, &state).is_ok());
	}

	#[test]
	fn non_member_cannot_send() {
		let create = create();
		let message = event(json!({
			"type": "m.room.message",
			"room_id": "!room:a.example",
			"sender": "@stranger:b.example",
			"content": { "body": "hello" },
		}));

		let state = AuthState { create: Some(&create), ..Default::default() };
		assert!(authorize(&message, &state).is_err());

		let joined = member("@stranger:b.example", "join");
		let state = AuthState {
			create: Some(&create),
			sender_member: Some(&joined),
			..Default::default()
		};
		assert!(authorize(&message, &state).is_ok());
	}

	#[test]
	fn state_changes_gated_by_power() {
		let create = create();
		let joined = member("@user:a.example", "join");
		let levels = event(json!({
			"type": "m.room.power_levels",
			"room_id": "!room:a.example",
			"sender": "@creator:a.example",
			"state_key": "",
			"content": {
				"users": { "@creator:a.example": 100 },
				"users_default": 0,
				"state_default": 50,
			},
		}));

		let rename = event(json!({
			"type": "m.room.name",
			"room_id": "!room:a.example",
			"sender": "@user:a.example",
			"state_key": "",
			"content": { "name": "new name" },
		}));

		let state = AuthState {
			create: Some(&create),
			power_levels: Some(&levels),
			sender_member: Some(&joined),
			..Default::default()
		};
		assert!(authorize(&rename, &state).is_err());

		let creator_joined = member("@creator:a.example", "join");
		let creator_rename = event(json!({
			"type": "m.room.name",
			"room_id": "!room:a.example",
			"sender": "@creator:a.example",
			"state_key": "",
			"content": { "name": "new name" },
		}));

		let state = AuthState {
			create: Some(&create),
			power_levels: Some(&levels),
			sender_member: Some(&creator_joined),
			..Default::default()
		};
		assert!(authorize(&creator_rename, &state).is_ok());
	}
}
