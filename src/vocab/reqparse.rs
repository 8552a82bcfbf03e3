use crate::prelude::*;

pub use self::parser::{requirement, versionspec};

peg::parser! {
    grammar parser() for str {
        rule wsp()
            = quiet!{ [' ' | '\t' ] }

        rule letter_or_digit()
            = quiet!{['A'..='Z' | 'a'..='z' | '0'..='9']} / expected!("letter or digit")

        rule _()
            = quiet!{ wsp()* }

        // '===' has to come before '==', or the ordered choice will commit to
        // '==' and then choke on the leftover '='.
        rule version_cmp() -> &'input str
            = $("<=" / "<" / "!=" / "===" / "==" / ">=" / ">" / "~=")

        rule version()
            = (letter_or_digit() / "-" / "_" / "." / "*" / "+" / "!")+

        rule version_one() -> Specifier
            = _ op:version_cmp() _ v:$(version())
            {
                use CompareOp::*;
                Specifier {
                    op: match op {
                        "==" => Equal,
                        "!=" => NotEqual,
                        "<=" => LessThanEqual,
                        "<" => StrictlyLessThan,
                        ">=" => GreaterThanEqual,
                        ">" => StrictlyGreaterThan,
                        "~=" => Compatible,
                        "===" => ArbitraryEqual,
                        _ => unreachable!(),
                    },
                    value: v.into(),
                }
            }

        rule version_many() -> Specifiers
            = specs:(version_one() ++ (_ ",")) { Specifiers(specs) }

        pub rule versionspec() -> Specifiers
            = ("(" vm:version_many() ")" { vm }) / version_many()

        rule urlspec() -> Requirement
            = "@" {? Err("direct url references not currently supported") }

        rule not_in() -> &'static str
            = "not" wsp()+ "in" { "not in" }

        rule marker_op() -> &'input str
            = _ op:(version_cmp() / $("in") / not_in()) { op }

        rule python_str_c() -> &'input str
            = $(quiet! { [' ' | '\t' | 'A'..='Z' | 'a'..='z' | '0'..='9' | '(' | ')'
                 | '.' | '{' | '}' | '-' | '_' | '*' | '#' | ':' | ';' | ','
                 | '/' | '?' | '[' | ']' | '!' | '~' | '`' | '@' | '$' | '%'
                 | '^' | '&' | '=' | '+' | '|' | '<' | '>'] })
              / expected!("printable character")

        // PEP 508 says that we don't have to support backslash escapes. It
        // also says that "existing implementations do support them", so the
        // first statement might be a lie -- maybe they're actually in use in
        // the wild. But they're complicated, so we might as well see how far
        // we can get while sticking to the spec.
        rule python_squote_str() -> &'input str
            = "'" s:$((python_str_c() / "\"")*) "'" { s }

        rule python_dquote_str() -> &'input str
            = "\"" s:$((python_str_c() / "'")*) "\"" { s }

        rule python_str() -> marker::Value
            = s:(python_squote_str() / python_dquote_str())
              { marker::Value::Literal(s.into()) }

        rule env_var() -> marker::Value
            = var:$(
                "python_version" / "python_full_version" / "os_name"
                / "sys_platform" / "platform_release" / "platform_system"
                / "platform_version" / "platform_machine"
                / "platform_python_implementation" / "implementation_name"
                / "implementation_version" / "extra"
              )
              { marker::Value::Variable(var.to_owned()) }

        rule marker_var() -> marker::Value
            = _ v:(env_var() / python_str()) { v }

        rule marker_expr() -> marker::Expr
            = _ "(" m:marker() _ ")" { m }
              / lhs:marker_var() op:marker_op() rhs:marker_var()
              {
                  use marker::Expr::Operator;
                  use marker::Op::*;
                  use CompareOp::*;
                  match op {
                      "<=" => Operator { op: Compare(LessThanEqual), lhs, rhs },
                      "<" => Operator { op: Compare(StrictlyLessThan), lhs, rhs },
                      "!=" => Operator { op: Compare(NotEqual), lhs, rhs },
                      "==" => Operator { op: Compare(Equal), lhs, rhs },
                      "===" => Operator { op: Compare(ArbitraryEqual), lhs, rhs },
                      ">=" => Operator { op: Compare(GreaterThanEqual), lhs, rhs },
                      ">" => Operator { op: Compare(StrictlyGreaterThan), lhs, rhs },
                      "~=" => Operator { op: Compare(Compatible), lhs, rhs },
                      "in" => Operator { op: In, lhs, rhs },
                      "not in" => Operator { op: NotIn, lhs, rhs },
                      _ => unreachable!(),
                  }
              }

        rule marker_and() -> marker::Expr
            = lhs:marker_expr() _ "and" _ rhs:marker_and()
                 { marker::Expr::And(Box::new(lhs), Box::new(rhs)) }
              / marker_expr()

        rule marker_or() -> marker::Expr
            = lhs:marker_and() _ "or" _ rhs:marker_or()
                 { marker::Expr::Or(Box::new(lhs), Box::new(rhs)) }
              / marker_and()

        rule marker() -> marker::Expr
            = marker_or()

        rule quoted_marker() -> marker::Expr
            = ";" _ m:marker() { m }

        rule identifier() -> &'input str
            = $(letter_or_digit() (letter_or_digit() / "-" / "_" / ".")*)

        rule name() -> PackageName
            = n:identifier() {? n.try_into().or(Err("error parsing package name")) }

        rule extras() -> Vec<String>
            = "[" _ es:(identifier() ** (_ "," _)) _ "]"
              { es.into_iter().map(|e| e.to_owned()).collect() }

        rule name_req() -> Requirement
            = name:name()
              _ extras:(extras() / "" { Vec::new() })
              _ specifiers:(versionspec() / "" { Specifiers(Vec::new()) })
              _ env_marker:(quoted_marker()?)
              {
                  Requirement {
                      name,
                      extras,
                      specifiers,
                      env_marker,
                  }
              }

        rule url_req() -> Requirement
            = name() _ _extras:(extras() / "" { Vec::new() }) _ r:urlspec() { r }

        pub rule requirement() -> Requirement
            = _ r:( url_req() / name_req() ) _ { r }
    }
}
