use crate::ast::{Expr, FunctionDecl, LiteralValue, Stmt};

/// Converts syntax trees to a parenthesised prefix form, used by the
/// `parse` subcommand and in parser tests.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            // ── literals ────────────────────────────────────────────────
            Expr::Literal(lit) => match lit {
                LiteralValue::True => "true".into(),

                LiteralValue::False => "false".into(),

                LiteralValue::Nil => "nil".into(),

                LiteralValue::Str(s) => s.clone(),

                LiteralValue::Number(n) => {
                    if n.fract() == 0.0 {
                        // 3 → 3.0
                        format!("{:.1}", n)
                    } else {
                        n.to_string()
                    }
                }
            },

            Expr::Grouping(inner) => format!("(group {})", Self::print(inner)),

            // ── operators ───────────────────────────────────────────────
            Expr::Unary { operator, right } => {
                format!("({} {})", operator.lexeme, Self::print(right))
            }

            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => format!(
                "({} {} {})",
                operator.lexeme,
                Self::print(left),
                Self::print(right)
            ),

            Expr::Ternary {
                guard,
                then_branch,
                else_branch,
            } => format!(
                "(?: {} {} {})",
                Self::print(guard),
                Self::print(then_branch),
                Self::print(else_branch)
            ),

            // ── names ───────────────────────────────────────────────────
            Expr::Variable { name, .. } => name.lexeme.clone(),

            Expr::Assign { name, value, .. } => {
                format!("(= {} {})", name.lexeme, Self::print(value))
            }

            Expr::This { .. } => "this".into(),

            Expr::Super { method, .. } => format!("(super {})", method.lexeme),

            // ── calls and properties ────────────────────────────────────
            Expr::Call {
                callee, arguments, ..
            } => {
                let mut s = format!("(call {}", Self::print(callee));
                for arg in arguments {
                    s.push(' ');
                    s.push_str(&Self::print(arg));
                }
                s.push(')');
                s
            }

            Expr::Get { object, name } => format!("(. {} {})", Self::print(object), name.lexeme),

            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "(= (. {} {}) {})",
                Self::print(object),
                name.lexeme,
                Self::print(value)
            ),

            Expr::Function(decl) => Self::function("fun", decl),
        }
    }

    pub fn print_stmt(stmt: &Stmt) -> String {
        match stmt {
            Stmt::Expression(expr) => format!("(; {})", Self::print(expr)),

            Stmt::Print(expr) => format!("(print {})", Self::print(expr)),

            Stmt::Var { name, initializer } => match initializer {
                Some(init) => format!("(var {} {})", name.lexeme, Self::print(init)),
                None => format!("(var {})", name.lexeme),
            },

            Stmt::Block(statements) => Self::block(statements),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(else_branch) => format!(
                    "(if {} {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch),
                    Self::print_stmt(else_branch)
                ),
                None => format!(
                    "(if {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch)
                ),
            },

            Stmt::While { condition, body } => format!(
                "(while {} {})",
                Self::print(condition),
                Self::print_stmt(body)
            ),

            Stmt::Break { .. } => "(break)".into(),

            Stmt::Function(decl) => Self::function("fun", decl),

            Stmt::Return { value, .. } => match value {
                Some(value) => format!("(return {})", Self::print(value)),
                None => "(return)".into(),
            },

            Stmt::Class(class) => {
                let mut s = format!("(class {}", class.name.lexeme);
                if let Some(superclass) = &class.superclass {
                    s.push_str(" < ");
                    s.push_str(&Self::print(superclass));
                }
                for method in &class.class_methods {
                    s.push(' ');
                    s.push_str(&Self::function("class", method));
                }
                for method in &class.methods {
                    s.push(' ');
                    s.push_str(&Self::function("method", method));
                }
                s.push(')');
                s
            }
        }
    }

    fn block(statements: &[Stmt]) -> String {
        let mut s = String::from("{");
        for stmt in statements {
            s.push(' ');
            s.push_str(&Self::print_stmt(stmt));
        }
        s.push_str(" }");
        s
    }

    fn function(tag: &str, decl: &FunctionDecl) -> String {
        let params: Vec<&str> = decl.params.iter().map(|p| p.lexeme.as_str()).collect();

        match &decl.name {
            Some(name) => format!(
                "({} {}({}) {})",
                tag,
                name.lexeme,
                params.join(" "),
                Self::block(&decl.body)
            ),
            None => format!("({} ({}) {})", tag, params.join(" "), Self::block(&decl.body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;
    use crate::parser::Parser;
    use crate::scanner::scan_tokens;

    fn print_expr(source: &str) -> String {
        let mut diagnostics = Diagnostics::new();
        let tokens = scan_tokens(source, &mut diagnostics);
        let expr = Parser::new(&tokens)
            .parse_expression(&mut diagnostics)
            .expect("expression should parse");
        AstPrinter::print(&expr)
    }

    #[test]
    fn prints_prefix_form() {
        assert_eq!(print_expr("-123 * (45.67)"), "(* (- 123.0) (group 45.67))");
        assert_eq!(print_expr("\"hi\" == nil"), "(== hi nil)");
    }

    #[test]
    fn ternary_and_comma() {
        assert_eq!(print_expr("a ? 1 : 2"), "(?: a 1.0 2.0)");
        assert_eq!(print_expr("1, 2, 3"), "(, (, 1.0 2.0) 3.0)");
        assert_eq!(print_expr("a ? b : c ? d : e"), "(?: a b (?: c d e))");
    }

    #[test]
    fn for_loop_is_printed_desugared() {
        let mut diagnostics = Diagnostics::new();
        let tokens = scan_tokens("for (var i = 0; i < 2; i = i + 1) print i;", &mut diagnostics);
        let statements = Parser::new(&tokens).parse(&mut diagnostics);

        assert!(!diagnostics.had_error());
        assert_eq!(
            AstPrinter::print_stmt(&statements[0]),
            "{ (var i 0.0) (while (< i 2.0) { (print i) (; (= i (+ i 1.0))) }) }"
        );
    }
}
