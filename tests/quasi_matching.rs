use indoc::indoc;
use quickcheck::{QuickCheck, TestResult};
use sanitree::ir::quasi::{Bindings, Pattern, QuasiError, Rewriter, Rule, RuleSet, parse_tree};
use sanitree::ir::render::render_to_string;
use sanitree::ir::{AttributeKey, NodeRef};
use test_utils::ir::generator::JsExpr;

fn tree(source: &str) -> NodeRef {
    parse_tree(source).unwrap()
}

#[test]
fn repeated_hole_must_bind_equal_subtrees() {
    let pattern = Pattern::parse("(Operation + @x @x)").unwrap();
    assert!(pattern.match_node(&tree("(Operation + a a)")).is_some());
    assert!(pattern.match_node(&tree("(Operation + a b)")).is_none());
    assert!(pattern.match_node(&tree("(Operation + (Operation call f 1) (Operation call f 1))")).is_some());
    assert!(pattern.match_node(&tree("(Operation - a a)")).is_none());
}

#[test]
fn instantiate_then_match_returns_the_bindings() {
    fn prop(target: JsExpr, callee: JsExpr, args: Vec<JsExpr>) -> TestResult {
        if args.len() > 4 {
            return TestResult::discard();
        }
        let template = match Pattern::parse("(ExpressionStmt (Operation = @lhs:Reference (Operation call @f @args*)))") {
            Ok(template) => template,
            Err(_) => return TestResult::failed(),
        };
        let parse = |expr: &JsExpr| parse_tree(&expr.to_quasi());
        let (Ok(value), Ok(f)) = (parse(&target), parse(&callee)) else {
            return TestResult::failed();
        };
        let Ok(args) = args.iter().map(parse).collect::<Result<Vec<_>, _>>() else {
            return TestResult::failed();
        };
        // Assignment targets must be references.
        let lhs = if value.tag() == sanitree::ir::KindTag::Reference { value } else { tree("fallback") };

        let bindings = Bindings::new().bind_single("lhs", lhs).bind_single("f", f).bind_many("args", args);
        let Ok(instance) = template.substitute(&bindings) else {
            return TestResult::failed();
        };
        match template.match_node(&instance) {
            Some(found) => TestResult::from_bool(found.structurally_equal(&bindings)),
            None => TestResult::failed(),
        }
    }

    QuickCheck::new().tests(200).quickcheck(prop as fn(JsExpr, JsExpr, Vec<JsExpr>) -> TestResult);
}

#[test]
fn spread_holes_capture_the_middle() {
    let pattern = Pattern::parse("(Operation call @f first @middle* last)").unwrap();
    let bindings = pattern.match_node(&tree("(Operation call g first 1 2 3 last)")).unwrap();
    assert_eq!(bindings.many("middle").map(|nodes| nodes.len()), Some(3));
    assert!(pattern.match_node(&tree("(Operation call g first last)")).is_some());
    assert!(pattern.match_node(&tree("(Operation call g last first)")).is_none());
}

#[test]
fn two_spreads_in_one_list_are_rejected() {
    let err = Pattern::parse("(ArrayConstructor @a* @b*)").unwrap_err();
    assert!(matches!(err, QuasiError::AmbiguousHoles { .. }));
}

#[test]
fn missing_binding_is_an_error() {
    let template = Pattern::parse("(Operation + @x @y)").unwrap();
    let bindings = Bindings::new().bind_single("x", tree("a"));
    assert_eq!(template.substitute(&bindings).unwrap_err(), QuasiError::MissingBinding("y".into()));
}

fn sanitizer_rules() -> RuleSet {
    RuleSet::new()
        .with_rule(
            Rule::parse(
                "guard-eval",
                "(Operation call eval @args*)",
                "(Operation call (Operation . __safe eval) @args*)",
            )
            .unwrap(),
        )
        .with_rule(Rule::parse("route-document-write", "(Operation . document write)", "(Operation . __safe write)").unwrap())
}

#[test]
fn rule_set_rewrites_a_whole_program() {
    let program = tree(indoc! {r#"
        ; a small script
        (Block
          (Declaration (Identifier code) "1+1")
          (ExpressionStmt (Operation call eval code))
          (FunctionDeclaration
            (FunctionConstructor (Identifier run) (FormalParam (Identifier s))
              (Block (ReturnStmt (Operation call (Operation . document write) s))))))
    "#});

    let rules = sanitizer_rules();
    let outcome = Rewriter::new(&rules).rewrite(&program).unwrap();
    assert_eq!(outcome.applied, ["guard-eval", "route-document-write"]);
    assert_eq!(
        render_to_string(&outcome.root),
        r#"{var code="1+1";__safe.eval(code);function run(s){return __safe.write(s);}}"#
    );

    let call = outcome.root.child(1).and_then(|stmt| stmt.child(0)).unwrap();
    assert!(call.has_attribute(AttributeKey::Synthetic));

    // A second pass has nothing left to do.
    let again = Rewriter::new(&rules).rewrite(&outcome.root).unwrap();
    assert!(again.applied.is_empty());
}
