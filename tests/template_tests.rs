//! Template engine tests for dynsql
//!
//! Tests for Handlebars statement templates and the `arg`, `add`, `where`
//! and `set` helpers.

use dynsql::dialect::{dollar_holder, question_holder};
use dynsql::template::{parse, TemplateSet, TemplateStatement};
use dynsql::{params, Action, Dialect, Error, Param, Value};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const USERS: &str = r#"
{{!-- user statements --}}
{{#*inline "findUser"}}
  SELECT * FROM users
  {{#where}}
    {{#if id}}AND id = {{arg id}}{{/if}}
    {{#if name}}AND name = {{arg name}}{{/if}}
  {{/where}}
{{/inline}}

{{#*inline "updateUser"}}
  UPDATE users
  {{#set}}
    {{#if name}}name = {{arg name}},{{/if}}
    {{#if email}}email = {{arg email}},{{/if}}
  {{/set}}
  WHERE id = {{arg id}}
{{/inline}}

{{#*inline "inlineWhere"}}
  SELECT * FROM users {{where "AND id =" (arg id) "AND status =" status}}
{{/inline}}

{{#*inline "inlineSet"}}
  UPDATE users {{updateSet "name =" name "email =" (arg email)}} WHERE id = {{arg id}}
{{/inline}}

{{#*inline "page"}}
  SELECT * FROM users LIMIT {{arg size}} OFFSET {{add page size}}
{{/inline}}

{{#*inline "byValue"}}SELECT * FROM users WHERE id = {{arg this}}{{/inline}}
"#;

fn set(dialect: Dialect) -> Arc<TemplateSet> {
    let mut set = TemplateSet::new(dialect);
    for source in parse(USERS).unwrap() {
        set.add(&source).unwrap();
    }
    Arc::new(set)
}

fn statement(id: &str, dialect: Dialect) -> TemplateStatement {
    TemplateStatement::new(id, set(dialect))
}

fn user(entries: &[(&str, Value)]) -> Vec<Param> {
    vec![Param::map(entries.iter().map(|(k, v)| (*k, v.clone())))]
}

mod documents {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_block_is_a_template() {
        let ids: Vec<String> = parse(USERS).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec!["findUser", "updateUser", "inlineWhere", "inlineSet", "page", "byValue"]
        );
    }

    #[test]
    fn stray_text_is_rejected() {
        let err = parse("SELECT 1 {{#*inline \"a\"}}SELECT 1{{/inline}}").unwrap_err();
        assert!(matches!(err, Error::ParseSyntax { span: Some((0, 1)), .. }));
    }

    #[test]
    fn unclosed_block() {
        assert!(matches!(
            parse("{{#*inline \"a\"}}SELECT 1"),
            Err(Error::ParseSyntax { .. })
        ));
    }

    #[test]
    fn unnamed_block() {
        assert!(parse("{{#*inline \"\"}}SELECT 1{{/inline}}").is_err());
    }

    #[test]
    fn invalid_handlebars_is_a_syntax_error() {
        let mut set = TemplateSet::new(Dialect::MySql);
        let sources = parse("{{#*inline \"bad\"}}SELECT {{#if a}}1{{/inline}}").unwrap();
        let err = set.add(&sources[0]).unwrap_err();
        assert!(matches!(err, Error::ParseSyntax { .. }));
        assert!(!set.contains("bad"));
    }
}

mod block_clauses {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn where_strips_leading_connector() {
        let meta = statement("findUser", Dialect::MySql)
            .compile(&user(&[("id", Value::from(5))]), question_holder)
            .unwrap();
        assert_eq!(meta.prepare_sql, "SELECT * FROM users WHERE id = ?");
        assert_eq!(meta.params, vec![Value::Int(5)]);
        assert_eq!(meta.vars, vec!["id"]);
        assert_eq!(meta.action, Action::Select);
    }

    #[test]
    fn where_is_empty_when_nothing_renders() {
        let meta = statement("findUser", Dialect::MySql)
            .compile(&user(&[("id", Value::from(0))]), question_holder)
            .unwrap();
        assert_eq!(meta.prepare_sql, "SELECT * FROM users");
        assert!(meta.params.is_empty());
    }

    #[test]
    fn where_with_dollar_markers() {
        let meta = statement("findUser", Dialect::Postgres)
            .compile(
                &user(&[("id", Value::from(5)), ("name", Value::from("bob"))]),
                dollar_holder,
            )
            .unwrap();
        assert_eq!(
            meta.prepare_sql,
            "SELECT * FROM users WHERE id = $1 AND name = $2"
        );
        assert_eq!(meta.params, vec![Value::Int(5), Value::from("bob")]);
    }

    #[test]
    fn set_strips_trailing_comma() {
        let meta = statement("updateUser", Dialect::MySql)
            .compile(
                &user(&[("id", Value::from(1)), ("email", Value::from("a@b.c"))]),
                question_holder,
            )
            .unwrap();
        assert_eq!(meta.prepare_sql, "UPDATE users SET email = ? WHERE id = ?");
        assert_eq!(meta.params, vec![Value::from("a@b.c"), Value::Int(1)]);
        assert_eq!(meta.action, Action::Update);
    }

    #[test]
    fn bound_values_keep_their_whitespace() {
        let meta = statement("findUser", Dialect::MySql)
            .compile(&user(&[("name", Value::from("a   b"))]), question_holder)
            .unwrap();
        assert_eq!(meta.params, vec![Value::from("a   b")]);
    }
}

mod inline_clauses {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn falsy_pairs_are_dropped() {
        let meta = statement("inlineWhere", Dialect::MySql)
            .compile(&user(&[("id", Value::from(3))]), question_holder)
            .unwrap();
        assert_eq!(meta.prepare_sql, "SELECT * FROM users WHERE id = ?");
        assert_eq!(meta.params, vec![Value::Int(3)]);
    }

    #[test]
    fn literal_values_are_quoted() {
        let meta = statement("inlineWhere", Dialect::MySql)
            .compile(
                &user(&[("id", Value::from(3)), ("status", Value::from("it's"))]),
                question_holder,
            )
            .unwrap();
        assert_eq!(
            meta.prepare_sql,
            "SELECT * FROM users WHERE id = ? AND status = 'it\\'s'"
        );
    }

    #[test]
    fn postgres_quoting_doubles_quotes() {
        let meta = statement("inlineWhere", Dialect::Postgres)
            .compile(
                &user(&[("id", Value::from(3)), ("status", Value::from("it's"))]),
                dollar_holder,
            )
            .unwrap();
        assert_eq!(
            meta.prepare_sql,
            "SELECT * FROM users WHERE id = $1 AND status = 'it''s'"
        );
    }

    #[test]
    fn generic_dialect_keeps_every_pair() {
        let meta = statement("inlineWhere", Dialect::Generic)
            .compile(&user(&[("id", Value::from(3))]), question_holder)
            .unwrap();
        assert_eq!(
            meta.prepare_sql,
            "SELECT * FROM users WHERE id = ? AND status = NULL"
        );
    }

    #[test]
    fn update_set_mixes_literals_and_binds() {
        let meta = statement("inlineSet", Dialect::Sqlite)
            .compile(
                &user(&[
                    ("id", Value::from(1)),
                    ("name", Value::from("bob")),
                    ("email", Value::from("b@x.io")),
                ]),
                question_holder,
            )
            .unwrap();
        assert_eq!(
            meta.prepare_sql,
            "UPDATE users SET name = 'bob', email = ? WHERE id = ?"
        );
        assert_eq!(meta.params, vec![Value::from("b@x.io"), Value::Int(1)]);
    }
}

mod helpers {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn add_sums_numbers() {
        let meta = statement("page", Dialect::MySql)
            .compile(
                &user(&[("page", Value::from(20)), ("size", Value::from(10))]),
                question_holder,
            )
            .unwrap();
        assert_eq!(meta.prepare_sql, "SELECT * FROM users LIMIT ? OFFSET 30");
        assert_eq!(meta.params, vec![Value::Int(10)]);
    }

    #[test]
    fn add_rejects_non_numbers() {
        let err = statement("page", Dialect::MySql)
            .compile(
                &user(&[("page", Value::from("x")), ("size", Value::from(10))]),
                question_holder,
            )
            .unwrap_err();
        assert!(matches!(err, Error::TemplateExecution { .. }));
        assert_eq!(err.code(), "template_execution");
    }

    #[test]
    fn scalar_parameter_is_the_context() {
        let meta = statement("byValue", Dialect::MySql)
            .compile(&params![42], question_holder)
            .unwrap();
        assert_eq!(meta.prepare_sql, "SELECT * FROM users WHERE id = ?");
        assert_eq!(meta.params, vec![Value::Int(42)]);
    }
}

mod binding {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn more_than_one_parameter_is_rejected() {
        let err = statement("byValue", Dialect::MySql)
            .compile(&params![1, 2], question_holder)
            .unwrap_err();
        assert!(matches!(err, Error::ParamResolution { .. }));
    }

    #[test]
    fn templates_include_each_other_as_partials() {
        let doc = r#"
            {{#*inline "cols"}}id, name{{/inline}}
            {{#*inline "listUsers"}}SELECT {{> cols}} FROM users{{/inline}}
        "#;
        let mut set = TemplateSet::new(Dialect::MySql);
        for source in parse(doc).unwrap() {
            set.add(&source).unwrap();
        }
        let meta = TemplateStatement::new("listUsers", Arc::new(set))
            .compile(&[], question_holder)
            .unwrap();
        assert_eq!(meta.prepare_sql, "SELECT id, name FROM users");
    }

    #[test]
    fn control_characters_in_context_are_rejected() {
        let mut set = TemplateSet::new(Dialect::MySql);
        for source in parse(r#"{{#*inline "echo"}}SELECT {{name}}{{/inline}}"#).unwrap() {
            set.add(&source).unwrap();
        }
        let err = TemplateStatement::new("echo", Arc::new(set))
            .compile(&user(&[("name", Value::from("a\u{1}b"))]), question_holder)
            .unwrap_err();
        assert!(matches!(err, Error::ParamResolution { .. }));
    }

    #[test]
    fn unknown_template() {
        let err = set(Dialect::MySql)
            .render("nope", None)
            .unwrap_err();
        assert!(matches!(err, Error::TemplateExecution { .. }));
    }

    #[test]
    fn compile_is_idempotent() {
        let s = statement("findUser", Dialect::MySql);
        let params = user(&[("id", Value::from(5)), ("name", Value::from("bob"))]);
        assert_eq!(
            s.compile(&params, question_holder).unwrap(),
            s.compile(&params, question_holder).unwrap()
        );
    }
}
