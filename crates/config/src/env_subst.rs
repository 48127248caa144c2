//! `${VAR}` and `${VAR:-fallback}` placeholders in raw config text.

/// Replace placeholders from the process environment.
///
/// Unresolved placeholders without a fallback are left as written, so the
/// parser or validator reports them in context.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with an explicit lookup.
pub fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let placeholder = &after[..end];
        let (name, fallback) = match placeholder.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (placeholder, None),
        };
        match (lookup(name).filter(|v| !v.is_empty()), fallback) {
            (Some(value), _) if !name.is_empty() => out.push_str(&value),
            (_, Some(fallback)) if !name.is_empty() => out.push_str(fallback),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "COURIER_TOKEN" => Some("123:abc".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[rstest]
    #[case("token = \"${COURIER_TOKEN}\"", "token = \"123:abc\"")]
    #[case("${MISSING}", "${MISSING}")]
    #[case("${MISSING:-8443}", "8443")]
    #[case("${COURIER_TOKEN:-unused}", "123:abc")]
    #[case("${EMPTY:-fallback}", "fallback")]
    #[case("${}", "${}")]
    #[case("a ${COURIER_TOKEN} b ${COURIER_TOKEN}", "a 123:abc b 123:abc")]
    #[case("cost: $5 and ${unterminated", "cost: $5 and ${unterminated")]
    #[case("plain text", "plain text")]
    fn substitutes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_env_with(input, lookup), expected);
    }
}
