//! Plausibility scoring of a decoded payload against its message type.

use crate::decode::*;
use crate::schema::*;
use std::collections::BTreeSet;

/// Evidence that a payload was encoded as a particular message type.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Score
{
    /// Distinct declared fields holding at least one plausible value.
    pub matched_fields: usize,

    /// Number of fields the message type declares.
    pub declared_fields: usize,

    /// Field records that held plausible values.
    pub values: usize,

    /// Records for undeclared fields, or with a wire type the declaration doesn't allow.
    pub unknown: usize,

    /// Values of the right wire type that make no sense for the field, such as undefined enum
    /// values or booleans other than 0 and 1.
    pub implausible: usize,

    /// Matched fields inside nested messages.
    pub nested_matched: usize,

    /// Malformed nested messages and unexplained values inside nested messages.
    pub nested_errors: usize,
}

impl Score
{
    /// Scores a decoded message.
    ///
    /// Returns `None` if the payload isn't structurally valid for the type at the top level, in
    /// which case the type can't be what the payload was encoded with.
    pub fn evaluate(msg: &MessageValue, set: &SchemaSet) -> Option<Score>
    {
        if !msg.is_well_formed() {
            return None;
        }

        let info = set.resolve_message(msg.msg_ref)?;
        let mut score = Score {
            declared_fields: info.field_count(),
            ..Default::default()
        };

        let mut matched = BTreeSet::new();
        for field in &msg.fields {
            if score.check(&field.value, set) {
                matched.insert(field.number);
                score.values += 1;
            }
        }
        score.matched_fields = matched.len();

        Some(score)
    }

    /// Share of the declared fields that were matched.
    pub fn coverage(&self) -> f64
    {
        match self.declared_fields {
            0 => 0.0,
            n => self.matched_fields as f64 / n as f64,
        }
    }

    /// True if anything in the payload was explained by the type.
    ///
    /// A type without this evidence is never picked, no matter how cleanly it decoded. Every
    /// payload made only of unknown fields decodes cleanly as an empty message.
    pub fn has_evidence(&self) -> bool
    {
        self.matched_fields > 0
    }

    /// Single number used to rank candidates. Higher is better.
    pub fn weight(&self) -> f64
    {
        self.matched_fields as f64 + 3.0 * self.coverage() + 0.5 * self.nested_matched as f64
            - 2.0 * (self.unknown + self.implausible) as f64
            - self.nested_errors as f64
    }

    /// Checks a single value, recording any negative evidence. Returns true if the value is
    /// plausible for its field.
    fn check(&mut self, value: &Value, set: &SchemaSet) -> bool
    {
        let plausible = match value {
            Value::Unknown(..) | Value::Incomplete(..) => {
                self.unknown += 1;
                return false;
            }
            Value::Message(inner) => {
                return match Score::evaluate(inner, set) {
                    Some(inner) => {
                        self.nested_matched += inner.matched_fields + inner.nested_matched;
                        self.nested_errors +=
                            inner.unknown + inner.implausible + inner.nested_errors;
                        true
                    }
                    None => {
                        self.nested_errors += 1;
                        false
                    }
                };
            }
            Value::Bool(b) => *b <= 1,
            Value::Enum(e) => is_defined(set, e.enum_ref, e.value),
            Value::Packed(PackedArray::Bool(values)) => values.iter().all(|b| *b <= 1),
            Value::Packed(PackedArray::Enum(eref, values)) => {
                values.iter().all(|v| is_defined(set, *eref, *v))
            }
            _ => true,
        };

        if !plausible {
            self.implausible += 1;
        }
        plausible
    }
}

fn is_defined(set: &SchemaSet, eref: EnumRef, value: i64) -> bool
{
    set.resolve_enum(eref)
        .map(|e| e.get_field_by_value(value).is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod test
{
    use super::*;

    fn set() -> SchemaSet
    {
        SchemaSet::parse(&[r#"
            syntax = "proto3";
            package score;

            enum Color { RED = 0; GREEN = 1; }
            message Empty {}
            message Paint { Color color = 1; bool glossy = 2; string name = 3; }
            message Can { Paint paint = 1; int32 volume = 2; }
        "#])
        .unwrap()
    }

    fn score(set: &SchemaSet, name: &str, data: &[u8]) -> Option<Score>
    {
        let msg = set.get_message(name).unwrap().decode(data, set);
        Score::evaluate(&msg, set)
    }

    #[test]
    fn empty_message_has_no_evidence()
    {
        let set = set();
        let empty = score(&set, "score.Empty", b"\x08\x01").unwrap();
        assert!(!empty.has_evidence());
        assert_eq!(empty.unknown, 1);

        let paint = score(&set, "score.Paint", b"\x08\x01").unwrap();
        assert!(paint.has_evidence());
        assert!(paint.weight() > empty.weight());
    }

    #[test]
    fn implausible_values()
    {
        let set = set();
        let paint = score(&set, "score.Paint", b"\x08\x07\x10\x05\x1a\x01x").unwrap();
        assert_eq!(paint.matched_fields, 1);
        assert_eq!(paint.implausible, 2);
    }

    #[test]
    fn coverage_counts_distinct_fields()
    {
        let set = set();
        let paint = score(&set, "score.Paint", b"\x1a\x01a\x1a\x01b\x10\x01").unwrap();
        assert_eq!(paint.matched_fields, 2);
        assert_eq!(paint.values, 3);
        assert!((paint.coverage() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn nested_evidence()
    {
        let set = set();
        let good = score(&set, "score.Can", b"\x0a\x04\x08\x01\x10\x01\x10\x05").unwrap();
        assert_eq!(good.matched_fields, 2);
        assert_eq!(good.nested_matched, 2);
        assert_eq!(good.nested_errors, 0);

        let bad = score(&set, "score.Can", b"\x0a\x02\x08\xff\x10\x05").unwrap();
        assert_eq!(bad.matched_fields, 1);
        assert_eq!(bad.nested_errors, 1);
        assert!(good.weight() > bad.weight());
    }

    #[test]
    fn unknown_groups_count_against()
    {
        let set = set();
        let paint = score(&set, "score.Paint", b"\x1a\x01x\x4b\x08\x01\x4c").unwrap();
        assert_eq!(paint.matched_fields, 1);
        assert_eq!(paint.unknown, 1);
        assert!(paint.weight() < score(&set, "score.Paint", b"\x1a\x01x").unwrap().weight());
    }

    #[test]
    fn malformed_is_rejected()
    {
        let set = set();
        assert_eq!(score(&set, "score.Paint", b"\x1a\x09short"), None);
        assert_eq!(score(&set, "score.Empty", b"\x00"), None);
    }
}
