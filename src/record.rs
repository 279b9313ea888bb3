//! Decoded MARC records as seen by the decomposer.
//!
//! A [`Record`] is the leader text plus its fields in directory order. Fields
//! keep the shape the decoder found them in: a [`Field::Control`] carries one
//! string payload, a [`Field::Data`] carries two indicators and a flat list of
//! alternating subfield code/value entries.

/// A decoded MARC record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Leader text (24 characters for records read from ISO 2709)
    pub leader: String,
    /// Fields in the order they appeared in the record directory
    pub fields: Vec<Field>,
}

/// A field of a decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// A field with a single unstructured payload.
    Control {
        /// Field tag
        tag: String,
        /// Raw payload
        data: String,
    },
    /// A field with indicators and subfields.
    Data {
        /// Field tag
        tag: String,
        /// First indicator
        indicator1: char,
        /// Second indicator
        indicator2: char,
        /// Alternating code/value entries: `["a", "Title", "c", "Author"]`
        subfields: Vec<String>,
    },
}

impl Record {
    /// Create an empty record with the given leader text
    #[must_use]
    pub fn new(leader: impl Into<String>) -> Self {
        Record {
            leader: leader.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field, preserving insertion order
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Builder-style [`Record::add_field`] for a control field
    #[must_use]
    pub fn with_control(mut self, tag: &str, data: &str) -> Self {
        self.add_field(Field::control(tag, data));
        self
    }

    /// Builder-style [`Record::add_field`] for a data field
    #[must_use]
    pub fn with_data(
        mut self,
        tag: &str,
        indicators: (char, char),
        subfields: &[(char, &str)],
    ) -> Self {
        self.add_field(Field::data(tag, indicators, subfields));
        self
    }
}

impl Field {
    /// Create a control-shaped field
    #[must_use]
    pub fn control(tag: &str, data: &str) -> Self {
        Field::Control {
            tag: tag.to_string(),
            data: data.to_string(),
        }
    }

    /// Create a data field from `(code, value)` pairs
    #[must_use]
    pub fn data(tag: &str, indicators: (char, char), subfields: &[(char, &str)]) -> Self {
        let mut flat = Vec::with_capacity(subfields.len() * 2);
        for (code, value) in subfields {
            flat.push(code.to_string());
            flat.push((*value).to_string());
        }
        Field::Data {
            tag: tag.to_string(),
            indicator1: indicators.0,
            indicator2: indicators.1,
            subfields: flat,
        }
    }

    /// Field tag
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Field::Control { tag, .. } | Field::Data { tag, .. } => tag,
        }
    }

    /// Scalar payload of the field.
    ///
    /// For data fields this is the subfield values joined by a single space.
    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Field::Control { data, .. } => data.clone(),
            Field::Data { subfields, .. } => subfields
                .iter()
                .skip(1)
                .step_by(2)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_field_flattens_pairs() {
        let field = Field::data("100", (' ', ' '), &[('a', "Name"), ('d', "1900")]);
        match &field {
            Field::Data { subfields, .. } => assert_eq!(subfields, &["a", "Name", "d", "1900"]),
            Field::Control { .. } => panic!("expected data field"),
        }
        assert_eq!(field.tag(), "100");
        assert_eq!(field.value(), "Name 1900");
    }

    #[test]
    fn test_record_preserves_field_order() {
        let record = Record::new("L1")
            .with_data("245", ('0', '0'), &[('a', "Title")])
            .with_control("008", "abc");
        let tags: Vec<&str> = record.fields.iter().map(Field::tag).collect();
        assert_eq!(tags, vec!["245", "008"]);
    }
}
