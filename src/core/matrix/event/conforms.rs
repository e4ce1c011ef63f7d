//! Structural and semantic conformance over a single event. The codes
//! are a closed enumeration and part of the failure-reporting contract:
//! names and positions are stable.

use std::fmt;

use itertools::Itertools;
use ruma::ServerName;

use super::Event;
use crate::matrix::event::{host_of, valid_mxid};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Code {
	InvalidOrMissingEventId = 0,
	InvalidOrMissingRoomId,
	InvalidOrMissingSenderId,
	MissingType,
	MissingOrigin,
	InvalidOrigin,
	InvalidOrMissingRedactsId,
	MissingMembership,
	InvalidMembership,
	MissingContentMembership,
	InvalidContentMembership,
	MissingPrevEvents,
	MissingPrevState,
	DepthNegative,
	DepthZero,
	MissingSignatures,
	MissingOriginSignature,
	MismatchOriginSender,
	MismatchOriginEventId,
	SelfRedacts,
	SelfPrevEvent,
	SelfPrevState,
	DupPrevEvent,
	DupPrevState,
}

const REFLECT: &[&str] = &[
	"INVALID_OR_MISSING_EVENT_ID",
	"INVALID_OR_MISSING_ROOM_ID",
	"INVALID_OR_MISSING_SENDER_ID",
	"MISSING_TYPE",
	"MISSING_ORIGIN",
	"INVALID_ORIGIN",
	"INVALID_OR_MISSING_REDACTS_ID",
	"MISSING_MEMBERSHIP",
	"INVALID_MEMBERSHIP",
	"MISSING_CONTENT_MEMBERSHIP",
	"INVALID_CONTENT_MEMBERSHIP",
	"MISSING_PREV_EVENTS",
	"MISSING_PREV_STATE",
	"DEPTH_NEGATIVE",
	"DEPTH_ZERO",
	"MISSING_SIGNATURES",
	"MISSING_ORIGIN_SIGNATURE",
	"MISMATCH_ORIGIN_SENDER",
	"MISMATCH_ORIGIN_EVENT_ID",
	"SELF_REDACTS",
	"SELF_PREV_EVENT",
	"SELF_PREV_STATE",
	"DUP_PREV_EVENT",
	"DUP_PREV_STATE",
];

impl Code {
	#[inline]
	#[must_use]
	pub const fn bit(self) -> u64 { 1_u64 << (self as u8) }

	#[must_use]
	pub fn reflect(self) -> &'static str { REFLECT[self as usize] }
}

impl fmt::Display for Code {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.reflect()) }
}

/// Bitset of conformance failures. Empty after masking means the event
/// may proceed; any residual bit is a non-retriable defect.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct Conforms {
	report: u64,
}

impl Conforms {
	/// Run every check. The returned set is unmasked; apply the caller's
	/// skip mask with [`Self::masked`].
	#[must_use]
	pub fn check(event: &Event) -> Self {
		let mut report = Self::default();
		report.check_ids(event);
		report.check_origin(event);
		report.check_signatures(event);
		report.check_redacts(event);
		report.check_membership(event);
		report.check_graph(event);
		report
	}

	/// Build a mask from a list of codes, for use as a skip set.
	#[must_use]
	pub fn mask(codes: &[Code]) -> Self {
		Self {
			report: codes.iter().fold(0, |acc, code| acc | code.bit()),
		}
	}

	#[inline]
	#[must_use]
	pub const fn masked(self, skip: Self) -> Self {
		Self { report: self.report & !skip.report }
	}

	#[inline]
	pub fn set(&mut self, code: Code) { self.report |= code.bit(); }

	#[inline]
	pub fn del(&mut self, code: Code) { self.report &= !code.bit(); }

	#[inline]
	#[must_use]
	pub const fn has(self, code: Code) -> bool { self.report & code.bit() != 0 }

	#[inline]
	#[must_use]
	pub const fn is_clean(self) -> bool { self.report == 0 }

	fn check_ids(&mut self, event: &Event) {
		if !event.event_id().is_some_and(|id| valid_mxid('$', id)) {
			self.set(Code::InvalidOrMissingEventId);
		}

		if !event.room_id().is_some_and(|id| valid_mxid('!', id)) {
			self.set(Code::InvalidOrMissingRoomId);
		}

		if !event.sender().is_some_and(|id| valid_mxid('@', id)) {
			self.set(Code::InvalidOrMissingSenderId);
		}

		if event.kind().is_none_or(str::is_empty) {
			self.set(Code::MissingType);
		}
	}

	fn check_origin(&mut self, event: &Event) {
		match event.origin() {
			| None | Some("") => self.set(Code::MissingOrigin),
			| Some(origin) =>
				if ServerName::parse(origin).is_err() {
					self.set(Code::InvalidOrigin);
				},
		}

		if !self.has(Code::InvalidOrMissingSenderId)
			&& event.origin() != event.sender().and_then(host_of)
		{
			self.set(Code::MismatchOriginSender);
		}

		if !self.has(Code::InvalidOrMissingEventId)
			&& event.origin() != event.event_id().and_then(host_of)
		{
			self.set(Code::MismatchOriginEventId);
		}
	}

	fn check_signatures(&mut self, event: &Event) {
		let signatures = event.signatures();
		if signatures.is_none_or(|sigs| sigs.is_empty()) {
			self.set(Code::MissingSignatures);
		}

		let origin_sigs = event
			.origin()
			.and_then(|origin| signatures?.get(origin));
		match origin_sigs {
			| Some(ruma::CanonicalJsonValue::Object(sigs)) if !sigs.is_empty() => {},
			| _ => self.set(Code::MissingOriginSignature),
		}
	}

	fn check_redacts(&mut self, event: &Event) {
		if event.kind() == Some("m.room.redaction")
			&& !event.redacts().is_some_and(|id| valid_mxid('$', id))
		{
			self.set(Code::InvalidOrMissingRedactsId);
		}

		if let Some(redacts) = event.redacts() {
			if event.event_id() == Some(redacts) {
				self.set(Code::SelfRedacts);
			}
		}
	}

	fn check_membership(&mut self, event: &Event) {
		if event.kind() != Some("m.room.member") {
			return;
		}

		match event.membership() {
			| None | Some("") => self.set(Code::MissingMembership),
			| Some(membership) =>
				if !lowercase_alpha(membership) {
					self.set(Code::InvalidMembership);
				},
		}

		match event.content_membership() {
			| None | Some("") => self.set(Code::MissingContentMembership),
			| Some(membership) =>
				if !lowercase_alpha(membership) {
					self.set(Code::InvalidContentMembership);
				},
		}
	}

	fn check_graph(&mut self, event: &Event) {
		let is_create = event.kind() == Some("m.room.create");

		if !is_create && event.prev_events().next().is_none() {
			self.set(Code::MissingPrevEvents);
		}

		if !is_create && event.is_state() && event.prev_state().next().is_none() {
			self.set(Code::MissingPrevState);
		}

		if event.depth().is_some_and(|depth| depth < 0) {
			self.set(Code::DepthNegative);
		}

		if !is_create && event.depth() == Some(0) {
			self.set(Code::DepthZero);
		}

		let event_id = event.event_id();
		for (i, prev) in event.prev_events().enumerate() {
			if Some(prev) == event_id {
				self.set(Code::SelfPrevEvent);
			}

			if event
				.prev_events()
				.enumerate()
				.any(|(j, other)| j != i && other == prev)
			{
				self.set(Code::DupPrevEvent);
			}
		}

		for (i, prev) in event.prev_state().enumerate() {
			if Some(prev) == event_id {
				self.set(Code::SelfPrevState);
			}

			if event
				.prev_state()
				.enumerate()
				.any(|(j, other)| j != i && other == prev)
			{
				self.set(Code::DupPrevState);
			}
		}
	}
}

impl fmt::Display for Conforms {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let names = (0..REFLECT.len())
			.filter(|i| self.report & (1_u64 << i) != 0)
			.map(|i| REFLECT[i])
			.join(" ");

		f.write_str(&names)
	}
}

impl fmt::Debug for Conforms {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Conforms[{self}]") }
}

fn lowercase_alpha(s: &str) -> bool { s.chars().all(|c| c.is_ascii_lowercase()) }
