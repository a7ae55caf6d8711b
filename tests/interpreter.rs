mod common;

#[cfg(test)]
mod interpreter_tests {
    use std::rc::Rc;

    use rox::lox::{Options, Status};
    use rox::value::Value;

    use crate::common::{self, output_of, run, run_with};

    fn runtime_error_of(source: &str) -> String {
        let outcome = run(source);
        assert_eq!(outcome.status, Status::RuntimeError, "{}", outcome.stderr);
        outcome.stderr
    }

    // ── expressions ─────────────────────────────────────────────────────

    #[test]
    fn test_arithmetic_and_formatting() {
        assert_eq!(
            output_of("print 10 / 2; print 2.5 * 2; print 1 + 2 * 3; print -(4 - 6); print 7 / 2;"),
            vec!["5", "5", "7", "2", "3.5"]
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            runtime_error_of("print 10 / 0;"),
            "Invalid 0 operand.\n[line 1]\n"
        );
    }

    #[test]
    fn test_equality_never_coerces() {
        assert_eq!(
            output_of(
                "print nil == nil; print nil == false; print \"1\" == 1; print 1 == 1; print \"a\" != \"b\";"
            ),
            vec!["true", "false", "false", "true", "true"]
        );
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            output_of("print \"a\" + \"b\"; print \"n\" + 1; print 2 + \"x\"; print \"t\" + true;"),
            vec!["ab", "n1", "2x", "ttrue"]
        );
    }

    #[test]
    fn test_operand_type_errors() {
        assert_eq!(
            runtime_error_of("print nil + 1;"),
            "Operands must be numbers.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("print 1 < \"2\";"),
            "Operands must be numbers.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("\n\nprint -\"x\";"),
            "Operand must be a number.\n[line 3]\n"
        );
    }

    #[test]
    fn test_truthiness_and_logic() {
        assert_eq!(
            output_of(
                "print !nil; print !0; print nil or \"default\"; print 1 and 2; print false and undefined;"
            ),
            vec!["true", "false", "default", "2", "false"]
        );
    }

    #[test]
    fn test_ternary_and_comma() {
        assert_eq!(
            output_of(
                "print true ? 1 : 2; print nil ? 1 : false ? 2 : 3; print (1, 2); var x = 0; print (x = 5, x + 1);"
            ),
            vec!["1", "3", "2", "6"]
        );
    }

    #[test]
    fn test_ternary_evaluates_one_branch() {
        assert_eq!(output_of("print true ? 1 : missing();"), vec!["1"]);
    }

    // ── variables and scope ────────────────────────────────────────────

    #[test]
    fn test_block_scoping_and_shadowing() {
        assert_eq!(
            output_of(
                "var a = \"global\";
                 {
                   fun showA() { print a; }
                   showA();
                   var a = \"block\";
                   showA();
                   print a;
                 }"
            ),
            vec!["global", "global", "block"]
        );
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(
            runtime_error_of("print y;"),
            "Undefined variable 'y'.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("y = 1;"),
            "Undefined variable 'y'.\n[line 1]\n"
        );
    }

    #[test]
    fn test_assignment_yields_value() {
        assert_eq!(
            output_of("var a; var b; a = b = 3; print a; { var c; print c = 4; }"),
            vec!["3", "4"]
        );
    }

    // ── control flow ───────────────────────────────────────────────────

    #[test]
    fn test_for_with_break() {
        assert_eq!(
            output_of("for (var i = 0; i < 3; i = i + 1) { if (i == 1) break; print i; }"),
            vec!["0"]
        );
    }

    #[test]
    fn test_break_leaves_only_the_innermost_loop() {
        assert_eq!(
            output_of(
                "for (var i = 0; i < 2; i = i + 1) {
                   var j = 0;
                   while (true) { if (j == 2) break; j = j + 1; }
                   print i + j;
                 }"
            ),
            vec!["2", "3"]
        );
    }

    #[test]
    fn test_return_unwinds_loops() {
        assert_eq!(
            output_of("fun f() { while (true) { return 3; } } print f(); fun g() {} print g();"),
            vec!["3", "nil"]
        );
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            output_of("fun fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } print fib(15);"),
            vec!["610"]
        );
    }

    // ── functions and closures ─────────────────────────────────────────

    #[test]
    fn test_closure_counter() {
        assert_eq!(
            output_of(
                "fun makeCounter() {
                   var i = 0;
                   fun count() { i = i + 1; print i; }
                   return count;
                 }
                 var counter = makeCounter();
                 counter();
                 counter();"
            ),
            vec!["1", "2"]
        );
    }

    #[test]
    fn test_independent_closures() {
        assert_eq!(
            output_of(
                "fun make() { var n = 0; return fun () { n = n + 1; return n; }; }
                 var a = make(); var b = make();
                 a(); a();
                 print a(); print b();"
            ),
            vec!["3", "1"]
        );
    }

    #[test]
    fn test_lambdas() {
        assert_eq!(
            output_of(
                "var add = fun (a, b) { return a + b; };
                 print add(1, 2);
                 print fun () {};
                 fun twice(f, x) { return f(f(x)); }
                 print twice(fun (n) { return n * 3; }, 2);"
            ),
            vec!["3", "<fn>", "18"]
        );
    }

    #[test]
    fn test_callable_display() {
        assert_eq!(
            output_of("fun f() {} print f; print clock; class A {} print A; print A();"),
            vec!["<fn f>", "<native fn clock>", "A", "A instance"]
        );
    }

    #[test]
    fn test_clock() {
        assert_eq!(output_of("print clock() > 0;"), vec!["true"]);
    }

    #[test]
    fn test_call_errors() {
        assert_eq!(
            runtime_error_of("fun f(a) {} f(1, 2);"),
            "Expected 1 arguments but got 2.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("\"str\"();"),
            "Can only call functions and classes.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("clock(1);"),
            "Expected 0 arguments but got 1.\n[line 1]\n"
        );
    }

    #[test]
    fn test_stack_overflow_is_a_runtime_error() {
        assert_eq!(
            runtime_error_of("fun f() { f(); } f();"),
            "Stack overflow.\n[line 1]\n"
        );
    }

    #[test]
    fn test_max_call_depth_is_configurable() {
        let options = Options {
            max_call_depth: 10,
            ..Options::default()
        };
        let source = "fun f(n) { if (n > 0) f(n - 1); } f(5); print \"ok\"; f(20);";

        let outcome = run_with(source, options);
        assert_eq!(outcome.status, Status::RuntimeError);
        assert_eq!(outcome.stdout, "ok\n");
        assert_eq!(outcome.stderr, "Stack overflow.\n[line 1]\n");
    }

    // ── classes ────────────────────────────────────────────────────────

    const INHERITANCE: &str = "
        class A {
          init(v) { this.v = v; }
          get() { return this.v; }
        }
        class B < A {
          get() { return super.get() + 1; }
        }
    ";

    #[test]
    fn test_super_call() {
        let source = format!("{} print B(1).get();", INHERITANCE);
        assert_eq!(output_of(&source), vec!["2"]);
    }

    #[test]
    fn test_super_result_follows_concatenation_rule() {
        let source = format!("{} print B(\"x\").get();", INHERITANCE);
        assert_eq!(output_of(&source), vec!["x1"]);

        let source = format!("{} print B(nil).get();", INHERITANCE);
        assert_eq!(
            runtime_error_of(&source),
            "Operands must be numbers.\n[line 7]\n"
        );
    }

    #[test]
    fn test_fields_and_methods() {
        assert_eq!(
            output_of(
                "class Box {
                   size() { return \"method\"; }
                 }
                 var b = Box();
                 print b.size();
                 b.size = \"field\";
                 print b.size;
                 var m = Box().size;
                 print m();"
            ),
            vec!["method", "field", "method"]
        );
    }

    #[test]
    fn test_this_is_bound_per_instance() {
        assert_eq!(
            output_of(
                "class P {
                   init(name) { this.name = name; }
                   hello() { return \"hi \" + this.name; }
                 }
                 var greet = P(\"ann\").hello;
                 P(\"bob\");
                 print greet();"
            ),
            vec!["hi ann"]
        );
    }

    #[test]
    fn test_initializer_semantics() {
        assert_eq!(
            output_of(
                "class A {
                   init() { this.x = 1; return; this.x = 2; }
                 }
                 var a = A();
                 print a.x;
                 print a.init() == a;
                 class NoInit {}
                 print NoInit().y = 3;"
            ),
            vec!["1", "true", "3"]
        );
    }

    #[test]
    fn test_inherited_initializer_sets_arity() {
        assert_eq!(
            runtime_error_of("class A { init(a, b) {} } class B < A {} B(1);"),
            "Expected 2 arguments but got 1.\n[line 1]\n"
        );
    }

    #[test]
    fn test_static_methods() {
        assert_eq!(
            output_of(
                "class Math {
                   class square(n) { return n * n; }
                   class name() { return this; }
                 }
                 class Sub < Math {
                   class square(n) { return super.square(n) + 1; }
                 }
                 class Plain < Math {}
                 print Math.square(3);
                 print Math.name();
                 print Sub.square(2);
                 print Plain.square(2);"
            ),
            vec!["9", "Math", "5", "4"]
        );
    }

    #[test]
    fn test_property_errors() {
        assert_eq!(
            runtime_error_of("print 1.x;"),
            "Only instances have properties.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("var n = 1; n.x = 2;"),
            "Only instances have fields.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("class A {} print A().missing;"),
            "Undefined property 'missing'.\n[line 1]\n"
        );
        assert_eq!(
            runtime_error_of("class A {} print A.missing;"),
            "Undefined property 'missing'.\n[line 1]\n"
        );
    }

    #[test]
    fn test_classes_hold_fields() {
        assert_eq!(
            output_of(
                "class A {
                   class twice(n) { return n * 2; }
                 }
                 A.x = 1;
                 print A.x;
                 print A.x = 5;
                 print A.twice(2);
                 A.twice = \"field\";
                 print A.twice;"
            ),
            vec!["1", "5", "4", "field"]
        );
        assert_eq!(
            runtime_error_of("class A {} A.x = 1; print A().x;"),
            "Undefined property 'x'.\n[line 1]\n"
        );
    }

    #[test]
    fn test_class_fields_are_per_class() {
        assert_eq!(
            output_of(
                "class A {}
                 class B < A {}
                 A.count = 1;
                 B.count = 2;
                 print A.count;
                 print B.count;"
            ),
            vec!["1", "2"]
        );
        assert_eq!(
            runtime_error_of("class A {} class B < A {} A.x = 1; print B.x;"),
            "Undefined property 'x'.\n[line 1]\n"
        );
    }

    #[test]
    fn test_deeply_nested_blocks_run() {
        let depth = 3000;
        let source = format!("{}print 1;{}", "{".repeat(depth), "}".repeat(depth));
        assert_eq!(output_of(&source), vec!["1"]);
    }

    #[test]
    fn test_deeply_nested_expressions_run() {
        let depth = 3000;
        let grouped = format!("print {}1{};", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(output_of(&grouped), vec!["1"]);

        let negated = format!("print {}1;", "-".repeat(depth));
        assert_eq!(output_of(&negated), vec!["1"]);
    }

    #[test]
    fn test_superclass_must_be_a_class() {
        assert_eq!(
            runtime_error_of("var NotClass = 1; class A < NotClass {}"),
            "Superclass must be a class.\n[line 1]\n"
        );
    }

    #[test]
    fn test_local_classes() {
        assert_eq!(
            output_of(
                "{
                   class A { m() { return 1; } }
                   class B < A { m() { return super.m() + 1; } }
                   print B().m();
                   print A;
                 }"
            ),
            vec!["2", "A"]
        );
    }

    #[test]
    fn test_methods_see_their_own_class() {
        assert_eq!(
            output_of(
                "{
                   class Node {
                     init(depth) { this.child = depth > 0 ? Node(depth - 1) : nil; }
                     count() { return this.child == nil ? 1 : 1 + this.child.count(); }
                   }
                   print Node(3).count();
                 }"
            ),
            vec!["4"]
        );
    }

    // ── sessions ───────────────────────────────────────────────────────

    #[test]
    fn test_runtime_error_stops_the_unit() {
        let outcome = run("print 1; print nil + 1; print 2;");

        assert_eq!(outcome.status, Status::RuntimeError);
        assert_eq!(outcome.stdout, "1\n");
    }

    #[test]
    fn test_static_error_prevents_execution() {
        let outcome = run("print 1; { var x = x; }");

        assert_eq!(outcome.status, Status::StaticError);
        assert_eq!(outcome.stdout, "");
        assert_eq!(
            outcome.stderr,
            "[line 1] Error at 'x': Can't read local variable in its own initializer.\n"
        );

        let outcome = run("print (1;");
        assert_eq!(outcome.status, Status::StaticError);
        assert_eq!(
            outcome.stderr,
            "[line 1] Error at ';': Expected ')' after expression\n"
        );
    }

    #[test]
    fn test_same_program_twice_gives_same_output() {
        let source = "
            class Counter { init() { this.n = 0; } tick() { this.n = this.n + 1; return this; } }
            var c = Counter();
            for (var i = 0; i < 5; i = i + 1) c.tick();
            print c.n;
            fun compose(f, g) { return fun (x) { return f(g(x)); }; }
            print compose(fun (x) { return x + 1; }, fun (x) { return x * 2; })(5);
        ";

        let first = run(source);
        let second = run(source);

        assert_eq!(first.status, Status::Ok);
        assert_eq!(first.stdout, "5\n11\n");
        assert_eq!(first.stdout, second.stdout);
        assert_eq!(first.stderr, second.stderr);
    }

    #[test]
    fn test_session_keeps_globals_between_runs() {
        let (mut session, buffer) = common::session();

        assert_eq!(session.run("var a = 1; fun show() { print a; }"), Status::Ok);
        assert_eq!(session.run("a = a + 1; show();"), Status::Ok);
        assert_eq!(
            session.run("{ var local = a; fun get() { return local; } a = get() * 10; }"),
            Status::Ok
        );
        assert_eq!(session.run("show();"), Status::Ok);

        assert_eq!(buffer.contents(), "2\n20\n");
    }

    #[test]
    fn test_session_recovers_after_errors() {
        let (mut session, buffer) = common::session();

        assert_eq!(
            session.run("var a = 1; a = 2; fun f() { return nil + 1; } f(); a = 3;"),
            Status::RuntimeError
        );
        assert!(session.diagnostics().had_runtime_error());

        assert_eq!(session.run("print a;"), Status::Ok);
        assert!(!session.diagnostics().had_runtime_error());

        assert_eq!(session.run("print ;"), Status::StaticError);
        assert_eq!(session.run("print a + 1;"), Status::Ok);

        assert_eq!(buffer.contents(), "2\n3\n");
    }

    #[test]
    fn test_evaluate_expression() {
        let (mut session, _buffer) = common::session();

        assert_eq!(session.evaluate("1 + 2 * 3"), Ok(Value::Number(7.0)));
        assert_eq!(
            session.evaluate("\"a\" + \"b\""),
            Ok(Value::String("ab".into()))
        );
        assert_eq!(session.evaluate("1 / 0"), Err(Status::RuntimeError));
        assert_eq!(session.evaluate("(1"), Err(Status::StaticError));

        session.run("var g = 41;");
        assert_eq!(session.evaluate("g + 1"), Ok(Value::Number(42.0)));
    }

    #[test]
    fn test_cyclic_objects_are_released_with_the_session() {
        let (mut session, _buffer) = common::session();

        session.run("class A {} var a = A(); a.me = a;");
        let Ok(Value::Instance(instance)) = session.evaluate("a") else {
            panic!("expected an instance");
        };

        let weak = Rc::downgrade(&instance);
        drop(instance);
        assert!(weak.upgrade().is_some());

        drop(session);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_class_field_cycles_are_released_with_the_session() {
        let (mut session, _buffer) = common::session();

        session.run("class A {} A.me = A;");
        let Ok(Value::Class(class)) = session.evaluate("A") else {
            panic!("expected a class");
        };

        let weak = Rc::downgrade(&class);
        drop(class);
        assert!(weak.upgrade().is_some());

        drop(session);
        assert!(weak.upgrade().is_none());
    }
}
