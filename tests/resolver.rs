mod common;

#[cfg(test)]
mod resolver_tests {
    use rox::error::{Diagnostics, LoxError};
    use rox::lox::{Lox, Options, Status};
    use rox::parser::Parser;
    use rox::resolver::{Binding, Resolutions, Resolver};
    use rox::scanner::scan_tokens;

    use crate::common;

    fn resolve(source: &str, deny_unused: bool) -> (Resolutions, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let tokens = scan_tokens(source, &mut diagnostics);
        let statements = Parser::new(&tokens).parse(&mut diagnostics);
        assert!(!diagnostics.had_error(), "source should parse: {}", source);

        let resolutions = Resolver::new(&mut diagnostics)
            .deny_unused(deny_unused)
            .resolve(&statements);
        (resolutions, diagnostics)
    }

    fn error_messages(diagnostics: &Diagnostics) -> Vec<String> {
        diagnostics.errors().iter().map(|e| e.to_string()).collect()
    }

    fn bindings(source: &str) -> Vec<Binding> {
        Lox::new(Options::default())
            .resolve_source(source)
            .expect("source should resolve")
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let source = "{ var a = 1; { var b = a; print b; } print a; }";
        assert_eq!(resolve(source, false).0, resolve(source, false).0);
    }

    #[test]
    fn test_slots_and_distances() {
        let found = bindings("{ var a = 1; var b = 2; { print a + b; } }");

        let summary: Vec<(&str, usize, usize)> = found
            .iter()
            .map(|b| (b.name.as_str(), b.distance, b.slot))
            .collect();
        assert_eq!(summary, vec![("a", 1, 0), ("b", 1, 1)]);
    }

    #[test]
    fn test_globals_are_not_recorded() {
        assert!(bindings("var g = 1; print g; fun f() { return g; } f();").is_empty());
    }

    #[test]
    fn test_parameters_share_the_body_frame() {
        let found = bindings("fun f(a, b) { var c = a; return b + c; } f(1, 2);");

        let summary: Vec<(&str, usize, usize)> = found
            .iter()
            .map(|b| (b.name.as_str(), b.distance, b.slot))
            .collect();
        assert_eq!(summary, vec![("a", 0, 0), ("b", 0, 1), ("c", 0, 2)]);
    }

    #[test]
    fn test_this_and_super_addresses() {
        let found = bindings(
            "class A { m() { return 1; } }
             class B < A { m() { return super.m() + this.n; } }",
        );

        let summary: Vec<(&str, usize, usize)> = found
            .iter()
            .map(|b| (b.name.as_str(), b.distance, b.slot))
            .collect();
        assert_eq!(summary, vec![("super", 2, 0), ("this", 1, 0)]);
    }

    #[test]
    fn test_read_in_own_initializer() {
        let (_, diagnostics) = resolve("{ var x = x; }", false);

        assert_eq!(
            error_messages(&diagnostics),
            vec!["[line 1] Error at 'x': Can't read local variable in its own initializer."]
        );
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        let (_, diagnostics) = resolve("{ var a = 1; var a = 2; print a; }", false);

        assert_eq!(
            error_messages(&diagnostics),
            vec!["[line 1] Error at 'a': Already a variable with this name in this scope."]
        );
    }

    #[test]
    fn test_global_redeclaration_is_allowed() {
        let (_, diagnostics) = resolve("var a = 1; var a = 2;", false);
        assert!(!diagnostics.had_error());
    }

    #[test]
    fn test_misplaced_keywords() {
        let cases = [
            ("break;", "Can't use 'break' outside of a loop."),
            ("return 1;", "Can't return from top-level code."),
            ("print this;", "Can't use 'this' outside of a class."),
            ("print super.x;", "Can't use 'super' outside of a class."),
            (
                "class A { m() { return super.m(); } }",
                "Can't use 'super' in a class with no superclass.",
            ),
            ("class A < A {}", "A class can't inherit from itself."),
            (
                "class A { init() { return 1; } }",
                "Can't return a value from an initializer.",
            ),
            (
                "while (true) { fun f() { break; } f(); }",
                "Can't use 'break' outside of a loop.",
            ),
        ];

        for (source, message) in cases {
            let (_, diagnostics) = resolve(source, false);
            assert!(
                diagnostics.errors().iter().any(|e| matches!(
                    e,
                    LoxError::Resolve { message: m, .. } if m == message
                )),
                "{:?} should report {:?}, got {:?}",
                source,
                message,
                error_messages(&diagnostics)
            );
        }
    }

    #[test]
    fn test_bare_return_in_initializer_is_fine() {
        let (_, diagnostics) = resolve("class A { init() { return; } }", false);
        assert!(!diagnostics.had_error());
    }

    #[test]
    fn test_unused_local_is_a_warning() {
        let (_, diagnostics) = resolve("{ var unused = 1; var used = 2; print used; }", false);

        assert!(!diagnostics.had_error());
        let warnings: Vec<String> = diagnostics.warnings().iter().map(|w| w.to_string()).collect();
        assert_eq!(
            warnings,
            vec!["[line 1] Warning at 'unused': Local variable is not used."]
        );
    }

    #[test]
    fn test_assignment_alone_does_not_count_as_use() {
        let (_, diagnostics) = resolve("{ var a; a = 1; }", false);
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn test_deny_unused_turns_warnings_into_errors() {
        let (_, diagnostics) = resolve("{ var unused = 1; }", true);

        assert!(diagnostics.warnings().is_empty());
        assert_eq!(
            error_messages(&diagnostics),
            vec!["[line 1] Error at 'unused': Local variable is not used."]
        );

        let outcome = common::run_with(
            "{ var unused = 1; } print 1;",
            Options {
                deny_unused: true,
                ..Options::default()
            },
        );
        assert_eq!(outcome.status, Status::StaticError);
        assert_eq!(outcome.stdout, "");
    }

    #[test]
    fn test_resolver_keeps_going_after_an_error() {
        let (_, diagnostics) = resolve("return 1; { var x = x; }", false);
        assert_eq!(diagnostics.errors().len(), 2);
    }

    #[test]
    fn test_deeply_nested_scopes_resolve() {
        let depth = 3000;
        let source = format!(
            "{}var x = 1; print x;{}",
            "{".repeat(depth),
            "}".repeat(depth)
        );

        let found = bindings(&source);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "x");
        assert_eq!(found[0].distance, 0);
    }
}
