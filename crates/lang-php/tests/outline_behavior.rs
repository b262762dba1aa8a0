use tokio_util::sync::CancellationToken;

use treeline_core::{DocumentBuffer, OutlineKind, ParsePipeline, PipelineOutput};
use treeline_php::PhpPipeline;

fn parse(source: &str) -> PipelineOutput {
    let buffer = DocumentBuffer::new("php", source);
    PhpPipeline::new().parse(&buffer.current(), &CancellationToken::new())
}

#[test]
fn missing_expression_reports_one_error_and_keeps_the_outline() {
    let source = "<?php class A { function f() { $x = ; } }";
    let output = parse(source);

    assert_eq!(output.errors.len(), 1, "errors: {:?}", output.errors);
    assert_eq!(output.errors[0].message, "expected expression");
    assert_eq!(
        output.errors[0].span.start,
        source.find(';').expect("source has a semicolon")
    );

    let class = output.tree.find("A").expect("class A is outlined");
    assert_eq!(class.kind, OutlineKind::Class);
    let method = class.find("f").expect("method f is outlined inside A");
    assert_eq!(method.kind, OutlineKind::Method);
}

#[test]
fn independent_errors_do_not_blank_out_other_regions() {
    let source = "\
<?php
class A { function f() { $x = ; } }
class B { function g() { $y = ; } }
class C { function h() { $z = 1; } }
";
    let output = parse(source);

    assert_eq!(output.errors.len(), 2, "errors: {:?}", output.errors);
    for (class, method) in [("A", "f"), ("B", "g"), ("C", "h")] {
        let node = output.tree.find(class).expect("class outlined");
        assert!(node.find(method).is_some(), "{class}.{method} missing");
    }
}

#[test]
fn parsing_is_deterministic() {
    let source = "<?php class A { public $x = ; function f() { } } stray";
    let first = parse(source);
    let second = parse(source);

    assert_eq!(first.tokens, second.tokens);
    assert_eq!(first.errors, second.errors);
    assert_eq!(first.tree, second.tree);
}

#[test]
fn markup_outside_code_regions_is_ignored() {
    let source = "<html><body><h1>no code here</h1></body></html>";
    let output = parse(source);

    assert!(output.errors.is_empty());
    assert!(output.tree.roots.is_empty());
    assert!(output.tokens.is_empty());
}

#[test]
fn each_code_region_folds_on_its_own() {
    let source = "<p><?php function a() { } ?></p><p><?php function b() { } ?></p>";
    let output = parse(source);

    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.tree.roots.len(), 2);
    for root in &output.tree.roots {
        assert_eq!(root.kind, OutlineKind::Region);
    }
    assert_eq!(output.tree.find("a").map(|n| n.kind), Some(OutlineKind::Function));
    assert_eq!(output.tree.find("b").map(|n| n.kind), Some(OutlineKind::Function));
}

#[test]
fn outline_covers_types_members_and_traits() {
    let source = "\
<?php
namespace Demo;

use Foo\\Bar;
use Foo\\{Baz, Qux};

class Outer {
    public const LIMIT = 10;
    private int $count = 0;
    public function __construct() { }
    public function names(): array { return $this->names; }
    use Helper;
}

interface Greeter { public function greet(string $name): string; }

trait Helper { public function help() { } }
";
    let output = parse(source);
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);

    let region = &output.tree.roots[0];
    assert_eq!(region.kind, OutlineKind::Region);

    // Imports fold as one region ahead of the declarations.
    assert_eq!(region.children[0].kind, OutlineKind::Region);
    assert!(region.children[0].span.len() > "use Foo\\Bar;".len());

    let outer = output.tree.find("Outer").expect("Outer");
    assert_eq!(outer.kind, OutlineKind::Class);
    assert_eq!(outer.find("LIMIT").map(|n| n.kind), Some(OutlineKind::Field));
    assert_eq!(outer.find("$count").map(|n| n.kind), Some(OutlineKind::Field));
    assert_eq!(
        outer.find("__construct").map(|n| n.kind),
        Some(OutlineKind::Method)
    );
    assert_eq!(outer.find("names").map(|n| n.kind), Some(OutlineKind::Method));

    let greeter = output.tree.find("Greeter").expect("Greeter");
    assert_eq!(greeter.kind, OutlineKind::Interface);
    assert_eq!(
        greeter.find("greet").map(|n| n.kind),
        Some(OutlineKind::Method)
    );

    let helper = output.tree.find("Helper").expect("Helper");
    assert_eq!(helper.kind, OutlineKind::Trait);
    assert_eq!(helper.find("help").map(|n| n.kind), Some(OutlineKind::Method));
}

#[test]
fn enum_cases_and_methods_are_outlined() {
    let source = "\
<?php
enum Suit: string {
    case Hearts = 'H';
    case Spades = 'S';
    public function color(): string { return 'red'; }
}
";
    let output = parse(source);
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);

    let suit = output.tree.find("Suit").expect("Suit");
    assert_eq!(suit.kind, OutlineKind::Enum);
    assert_eq!(suit.find("Hearts").map(|n| n.kind), Some(OutlineKind::Field));
    assert_eq!(suit.find("Spades").map(|n| n.kind), Some(OutlineKind::Field));
    assert_eq!(suit.find("color").map(|n| n.kind), Some(OutlineKind::Method));
}

#[test]
fn const_lists_declare_one_field_per_name() {
    let output = parse("<?php class A { const X = 1, Y = 2; }");
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);

    let class = output.tree.find("A").expect("A");
    assert!(class.find("X").is_some());
    assert!(class.find("Y").is_some());
}

#[test]
fn top_level_statements_are_skipped_without_errors() {
    let source = "<?php echo 'hello'; $x = 1; function f() { } ?>";
    let output = parse(source);

    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.tree.find("f").map(|n| n.kind), Some(OutlineKind::Function));
}

#[test]
fn missing_expression_in_a_top_level_statement_is_reported() {
    let output = parse("<?php $x = ; ?>");
    assert_eq!(output.errors.len(), 1);
    assert_eq!(output.errors[0].message, "expected expression");
}

#[test]
fn unterminated_body_reports_unbalanced_brace() {
    let output = parse("<?php class A { function f() {");
    assert!(
        output
            .errors
            .iter()
            .any(|e| e.message.contains("unbalanced `{`")),
        "errors: {:?}",
        output.errors
    );
    assert!(output.tree.find("A").is_some());
}

#[test]
fn unterminated_region_still_outlines() {
    let output = parse("<?php\nfunction f() { return 1; }");
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.tree.find("f").map(|n| n.kind), Some(OutlineKind::Function));
}

#[test]
fn lex_errors_surface_alongside_parse_errors() {
    let output = parse("<?php class A { public $x = `; }");
    assert!(
        output
            .errors
            .iter()
            .any(|e| e.message.contains("unexpected character")),
        "errors: {:?}",
        output.errors
    );
    assert!(output.tree.find("A").is_some());
}

#[test]
fn pre_cancelled_parse_is_tagged_partial() {
    let buffer = DocumentBuffer::new("php", "<?php class A { }");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let output = PhpPipeline::new().parse(&buffer.current(), &cancel);
    assert!(output.cancelled);
}
