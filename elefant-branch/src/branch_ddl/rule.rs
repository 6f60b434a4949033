use regex::{Captures, Regex};
use crate::models::Rule;
use crate::quoting::{AttemptedKeywordUsage, IdentifierQuoter};

/// Rewrites a rule of a table so it applies to the branch view of the table instead.
///
/// The rule is renamed to `view_<name>`, and every reference to the table, qualified with its
/// schema or not, now points at the view in the branch schema.
pub(crate) fn rewrite_rule_for_view(rule: &Rule, schema: &str, namespace: &str, quoter: &IdentifierQuoter) -> Rule {
    let new_name = format!("view_{}", rule.name);
    let quoted_name = quoter.quote(&new_name, AttemptedKeywordUsage::Other);

    let header = Regex::new(r#"^CREATE RULE ("(?:[^"]|"")+"|\S+) AS"#).map(|re| {
        re.replace(&rule.definition, |_: &Captures| format!("CREATE RULE {quoted_name} AS"))
            .into_owned()
    });
    let definition = header.unwrap_or_else(|_| rule.definition.clone());

    let quoted_schema = quoter.quote(schema, AttemptedKeywordUsage::Other);
    let quoted_table = quoter.quote(&rule.table_name, AttemptedKeywordUsage::Other);
    let qualified_view = quoter.quote_qualified(namespace, &rule.table_name);

    let pattern = format!(
        r#"(?P<qualifier>(?:"(?:[^"]|"")+"|\w+)\.)?{}"#,
        identifier_pattern(&quoted_table)
    );

    let definition = match Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(&definition, |caps: &Captures| {
                let whole = &caps[0];
                match caps.name("qualifier") {
                    Some(q) if q.as_str().trim_end_matches('.') != quoted_schema => whole.to_string(),
                    _ => qualified_view.clone(),
                }
            })
            .into_owned(),
        Err(_) => definition,
    };

    Rule {
        name: new_name,
        table_name: rule.table_name.clone(),
        definition,
    }
}

/// Matches an identifier only on identifier boundaries.
fn identifier_pattern(quoted: &str) -> String {
    let escaped = regex::escape(quoted);
    if quoted.starts_with('"') {
        escaped
    } else {
        format!(r"\b{escaped}\b")
    }
}
