use indexmap::IndexMap;

/// A single line protocol record.
///
/// Records are built fresh for every flush and discarded once encoded. Tags and fields keep their insertion order,
/// which is also the order they are written in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricLine {
    name: String,
    tags: IndexMap<String, String>,
    fields: IndexMap<String, String>,
}

impl MetricLine {
    /// Creates an empty `MetricLine` with the given measurement name.
    pub fn new<N>(name: N) -> Self
    where
        N: Into<String>,
    {
        Self { name: name.into(), tags: IndexMap::new(), fields: IndexMap::new() }
    }

    /// Returns the measurement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tags, in the order they were added.
    pub fn tags(&self) -> &IndexMap<String, String> {
        &self.tags
    }

    /// Returns the fields, in the order they were added.
    pub fn fields(&self) -> &IndexMap<String, String> {
        &self.fields
    }

    /// Sets a tag, replacing any existing value for the same key.
    pub fn set_tag<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key.into(), value.into());
    }

    /// Sets a field, replacing any existing value for the same key.
    ///
    /// Values are written as-is, so numbers must already be formatted by the caller.
    pub fn set_field<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.fields.insert(key.into(), value.into());
    }

    /// Returns `true` if the record has at least one field.
    ///
    /// The line protocol has no representation for a record without fields, so such records are never sent.
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Encodes the record as a single newline-terminated line.
    pub fn encode(&self) -> String {
        let mut buf = String::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes the record, appending it to `buf`.
    ///
    /// The measurement name is written first, followed by `,key=value` for every tag, a single space, and then the
    /// comma-separated `key=value` field list. Keys and tag values go through [`escape_tag`], field values through
    /// [`escape_field_value`].
    pub fn encode_into(&self, buf: &mut String) {
        buf.push_str(&self.name);

        for (key, value) in &self.tags {
            buf.push(',');
            write_escaped_tag(buf, key);
            buf.push('=');
            write_escaped_tag(buf, value);
        }

        let mut wrote_field = false;
        for (key, value) in &self.fields {
            buf.push(if wrote_field { ',' } else { ' ' });
            wrote_field = true;

            write_escaped_tag(buf, key);
            buf.push('=');
            write_escaped_field_value(buf, value);
        }

        buf.push('\n');
    }

    fn encoded_len_hint(&self) -> usize {
        let tags: usize = self.tags.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
        let fields: usize = self.fields.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
        self.name.len() + tags + fields + 1
    }
}

/// Escapes a key or tag value.
///
/// Commas, spaces, equals signs and backslashes are prefixed with a backslash.
pub fn escape_tag(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    write_escaped_tag(&mut out, input);
    out
}

/// Escapes a field value.
///
/// Double quotes and backslashes are prefixed with a backslash.
pub fn escape_field_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    write_escaped_field_value(&mut out, input);
    out
}

fn write_escaped_tag(buf: &mut String, input: &str) {
    for c in input.chars() {
        if matches!(c, ',' | ' ' | '=' | '\\') {
            buf.push('\\');
        }
        buf.push(c);
    }
}

fn write_escaped_field_value(buf: &mut String, input: &str) {
    for c in input.chars() {
        if matches!(c, '"' | '\\') {
            buf.push('\\');
        }
        buf.push(c);
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use proptest::{collection::vec as arb_vec, prelude::*, proptest};

    use super::{escape_field_value, escape_tag, MetricLine};

    /// Splits `input` on the first occurrence of `delim` that is not preceded by an escaping backslash.
    fn split_unescaped(input: &str, delim: char) -> (&str, Option<&str>) {
        let mut escaped = false;
        for (idx, c) in input.char_indices() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == delim {
                return (&input[..idx], Some(&input[idx + c.len_utf8()..]));
            }
        }
        (input, None)
    }

    fn split_all_unescaped(mut input: &str, delim: char) -> Vec<&str> {
        let mut parts = Vec::new();
        loop {
            let (head, rest) = split_unescaped(input, delim);
            parts.push(head);
            match rest {
                Some(rest) => input = rest,
                None => return parts,
            }
        }
    }

    fn unescape(input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut escaped = false;
        for c in input.chars() {
            if !escaped && c == '\\' {
                escaped = true;
                continue;
            }
            escaped = false;
            out.push(c);
        }
        out
    }

    fn parse_pairs(section: &str) -> IndexMap<String, String> {
        split_all_unescaped(section, ',')
            .into_iter()
            .map(|pair| {
                let (key, value) = split_unescaped(pair, '=');
                (unescape(key), unescape(value.expect("pair should contain '='")))
            })
            .collect()
    }

    fn parse_line(line: &str) -> MetricLine {
        let line = line.strip_suffix('\n').expect("line should be newline-terminated");
        let (head, fields) = split_unescaped(line, ' ');
        let (name, tags) = split_unescaped(head, ',');

        let mut parsed = MetricLine::new(name);
        if let Some(tags) = tags {
            for (key, value) in parse_pairs(tags) {
                parsed.set_tag(key, value);
            }
        }
        for (key, value) in parse_pairs(fields.expect("line should contain a field section")) {
            parsed.set_field(key, value);
        }
        parsed
    }

    #[test]
    fn encodes_tags_and_fields_in_insertion_order() {
        let mut line = MetricLine::new("ircd");
        line.set_tag("server", "irc.example.net");
        line.set_field("users", "42");
        line.set_field("rate_in", "1024");
        line.set_field("sockets", "17");

        assert_eq!(line.encode(), "ircd,server=irc.example.net users=42,rate_in=1024,sockets=17\n");
    }

    #[test]
    fn encodes_without_tags() {
        let mut line = MetricLine::new("ircd");
        line.set_field("users", "1");

        assert_eq!(line.encode(), "ircd users=1\n");
    }

    #[test]
    fn replaces_duplicate_keys_in_place() {
        let mut line = MetricLine::new("ircd");
        line.set_field("users", "1");
        line.set_field("sockets", "2");
        line.set_field("users", "3");

        assert_eq!(line.encode(), "ircd users=3,sockets=2\n");
    }

    #[test]
    fn tag_escaping() {
        assert_eq!(escape_tag("a,b=c"), "a\\,b\\=c");
        assert_eq!(escape_tag("two words"), "two\\ words");
        assert_eq!(escape_tag("back\\slash"), "back\\\\slash");
        assert_eq!(escape_tag("say \"hi\""), "say\\ \"hi\"");
    }

    #[test]
    fn field_value_escaping() {
        assert_eq!(escape_field_value("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_field_value("back\\slash"), "back\\\\slash");
        assert_eq!(escape_field_value("a,b=c d"), "a,b=c d");
    }

    #[test]
    fn escaping_applies_to_keys_and_values() {
        let mut line = MetricLine::new("ircd");
        line.set_tag("server name", "a,b=c");
        line.set_field("motd", "say \"hi\"");

        assert_eq!(line.encode(), "ircd,server\\ name=a\\,b\\=c motd=say \\\"hi\\\"\n");
    }

    #[test]
    fn record_without_fields() {
        let mut line = MetricLine::new("ircd");
        line.set_tag("server", "irc.example.net");

        assert!(!line.has_fields());
        assert_eq!(line.encode(), "ircd,server=irc.example.net\n");
    }

    fn arb_text() -> impl Strategy<Value = String> {
        "[a-z0-9 ,=\"\\\\]{1,16}"
    }

    // Field values leave commas unescaped, so a comma inside one cannot be told apart from a field separator.
    fn arb_field_value() -> impl Strategy<Value = String> {
        "[a-z0-9 =\"\\\\]{1,16}"
    }

    fn arb_line() -> impl Strategy<Value = MetricLine> {
        let name = "[a-z][a-z0-9_]{0,15}";
        let tags = arb_vec((arb_text(), arb_text()), 0..4);
        let fields = arb_vec((arb_text(), arb_field_value()), 1..8);

        (name, tags, fields).prop_map(|(name, tags, fields)| {
            let mut line = MetricLine::new(name);
            for (key, value) in tags {
                line.set_tag(key, value);
            }
            for (key, value) in fields {
                line.set_field(key, value);
            }
            line
        })
    }

    proptest! {
        #[test]
        fn property_test_reparse(line in arb_line()) {
            let encoded = line.encode();

            prop_assert_eq!(encoded.matches('\n').count(), 1);
            prop_assert_eq!(parse_line(&encoded), line);
        }

        #[test]
        fn property_test_safe_input_is_unchanged(input in "[a-zA-Z0-9_.:-]{0,32}") {
            prop_assert_eq!(escape_tag(&input), input.clone());
            prop_assert_eq!(escape_field_value(&input), input);
        }
    }
}
