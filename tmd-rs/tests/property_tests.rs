use proptest::prelude::*;
use tmd::blocks::{extract, join_continuations};
use tmd::classify::Offline;
use tmd::filters::parse_def;
use tmd::markup::{linebreaks, transform};
use tmd::render::filters::escape_html;
use tmd::script::expr::{eval_str, parse_expr};
use tmd::script::Value;
use tmd::Context;

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "if", "else", "def", "return", "is", "for", "lambda",
];

proptest! {
    /// Extraction never panics on arbitrary input in lenient mode.
    #[test]
    fn extract_does_not_panic(s in "\\PC*") {
        let _ = extract(&s, false);
    }

    /// The expression parser returns Ok or Err, never panics.
    #[test]
    fn expression_parser_does_not_panic(s in "\\PC{0,64}") {
        let _ = parse_expr(&s);
    }

    /// Evaluating arbitrary short input in an empty scope never panics.
    #[test]
    fn evaluator_does_not_panic(s in "[0-9a-z+*/%()\\[\\]'., <>=:-]{0,40}") {
        let _ = eval_str(&s, &Context::new());
    }

    /// Slicing with any bounds and any non-zero step stays in range.
    #[test]
    fn slices_with_extreme_bounds(start in any::<i64>(), stop in any::<i64>(), step in any::<i64>()) {
        prop_assume!(step != 0);
        let v = Value::List((1..=4).map(Value::Int).collect());
        if let Ok(Value::List(picked)) = v.slice(Some(start), Some(stop), Some(step)) {
            prop_assert!(picked.len() <= 4);
        }
        let text = Value::from("abcd");
        let _ = text.slice(None, Some(stop), Some(step));
    }

    /// Text with no markup characters passes through the transformer unchanged.
    #[test]
    fn plain_text_is_untouched(s in "[a-zA-Z0-9 ,.!?\n]{0,80}") {
        prop_assert_eq!(transform(&s, &Offline), s);
    }

    /// Paragraph conversion never leaves a raw newline inside a paragraph.
    #[test]
    fn linebreaks_wraps_every_paragraph(s in "[a-z \n]{0,60}") {
        let out = linebreaks(&s);
        for para in out.split("\n\n") {
            prop_assert!(para.starts_with("<p>") && para.ends_with("</p>"));
            prop_assert!(!para.contains('\n'));
        }
    }

    /// Escaped text contains no markup-significant characters.
    #[test]
    fn escaped_text_is_inert(s in "\\PC{0,64}") {
        let out = escape_html(&s);
        prop_assert!(!out.contains('<') && !out.contains('>'));
        prop_assert!(!out.contains('"') && !out.contains('\''));
    }

    /// Continuation joining only removes text; without backslashes it is
    /// the identity.
    #[test]
    fn continuations_without_backslash(s in "[a-z \n\t]{0,60}") {
        prop_assert_eq!(join_continuations(&s), s);
    }

    /// Renaming a filter parameter never touches an identifier it merely
    /// prefixes.
    #[test]
    fn parameter_renaming_is_injective(p in "[a-z]{1,4}", suffix in "[a-z0-9]{1,3}") {
        let other = format!("{p}{suffix}");
        prop_assume!(!KEYWORDS.contains(&p.as_str()) && !KEYWORDS.contains(&other.as_str()));
        let def = parse_def(&format!("f({p}) <= {p} + {other}")).expect("declaration parses");
        let synthesized = def.synthesize().expect("body parses");
        prop_assert!(synthesized.contains(&format!("(a + {other})")), "{}", synthesized);
    }

    /// `list` declarations equal the verbatim expression.
    #[test]
    fn list_declarations_match_direct_evaluation(xs in prop::collection::vec(-1000i64..1000, 0..8)) {
        let expr = format!(
            "[{}]",
            xs.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
        );
        let ctx = tmd::infer::infer(&format!("v: list => {expr}"), &Context::new(), false)
            .expect("declaration evaluates");
        let expected = Value::List(xs.into_iter().map(Value::Int).collect());
        prop_assert_eq!(ctx.get("v"), Some(&expected));
    }
}
