//! Domain helpers injected into statement templates
//!
//! - `arg value`: capture `value` as a bind parameter
//! - `add a b ...`: numeric sum
//! - `where` / `set` / `updateSet`: assemble `WHERE` / `SET` clauses, either
//!   from a block body or from inline `(fragment, value)` pairs

use super::{decode_arg, encode_arg, is_arg_token};
use crate::dialect::Dialect;
use crate::mapper::render::{set_clause, where_clause};
use crate::value::{ParamValue, Value};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason, Renderable, ScopedJson,
};
use serde_json::Value as Json;

/// Register every domain helper for `dialect`
pub fn register(registry: &mut Handlebars<'static>, dialect: Dialect) {
    registry.register_helper("arg", Box::new(ArgHelper));
    registry.register_helper("add", Box::new(AddHelper));
    registry.register_helper(
        "where",
        Box::new(ClauseHelper {
            kind: ClauseKind::Where,
            dialect,
        }),
    );
    for name in ["set", "updateSet"] {
        registry.register_helper(
            name,
            Box::new(ClauseHelper {
                kind: ClauseKind::Set,
                dialect,
            }),
        );
    }
}

fn helper_error(message: impl Into<String>) -> RenderError {
    RenderErrorReason::Other(message.into()).into()
}

/// `{{arg value}}`
struct ArgHelper;

impl HelperDef for ArgHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let param = h
            .param(0)
            .ok_or_else(|| helper_error("arg expects one value"))?;
        let name = param.relative_path().map(String::as_str);
        Ok(ScopedJson::Derived(Json::String(encode_arg(
            name,
            param.value(),
        ))))
    }
}

/// `{{add a b ...}}`
struct AddHelper;

impl HelperDef for AddHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let operands = h
            .params()
            .iter()
            .map(|p| number(p.value()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScopedJson::Derived(sum(&operands)))
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn number(json: &Json) -> Result<Number, RenderError> {
    let json = match json.as_str().filter(|s| is_arg_token(s)) {
        Some(token) => decode_arg(token).map(|(_, v)| v).unwrap_or(Json::Null),
        None => json.clone(),
    };
    match &json {
        Json::Number(n) => Ok(n
            .as_i64()
            .map(Number::Int)
            .unwrap_or_else(|| Number::Float(n.as_f64().unwrap_or_default()))),
        Json::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Number::Int)
            .or_else(|_| s.trim().parse::<f64>().map(Number::Float))
            .map_err(|_| helper_error(format!("add expects numbers, got {:?}", s))),
        other => Err(helper_error(format!("add expects numbers, got {}", other))),
    }
}

fn sum(operands: &[Number]) -> Json {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;

    for n in operands {
        match n {
            Number::Int(i) => {
                int_total = int_total.and_then(|t| t.checked_add(*i));
                float_total += *i as f64;
            }
            Number::Float(f) => {
                int_total = None;
                float_total += f;
            }
        }
    }

    match int_total {
        Some(total) => Json::from(total),
        None => Json::from(float_total),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClauseKind {
    Where,
    Set,
}

/// `{{#where}}...{{/where}}` or `{{where "AND a =" (arg a) ...}}`
struct ClauseHelper {
    kind: ClauseKind,
    dialect: Dialect,
}

/// Right-hand side of an inline clause pair
enum Operand {
    /// Already captured by `arg`; rendered as its token
    Bind { token: String, value: ParamValue },
    /// Plain value, rendered as a quoted literal
    Literal(Value),
}

impl Operand {
    fn from_json(json: &Json) -> Self {
        if let Some(token) = json.as_str().filter(|s| is_arg_token(s)) {
            let value = decode_arg(token)
                .map(|(_, v)| Value::from(v))
                .unwrap_or(Value::Null);
            return Operand::Bind {
                token: token.to_string(),
                value: ParamValue(value),
            };
        }
        Operand::Literal(Value::from(json.clone()))
    }

    fn is_truthy(&self) -> bool {
        match self {
            Operand::Bind { value, .. } => value.value().is_truthy(),
            Operand::Literal(v) => v.is_truthy(),
        }
    }

    fn render(&self, dialect: Dialect) -> String {
        match self {
            Operand::Bind { token, .. } => token.clone(),
            Operand::Literal(v) => dialect.quote(v),
        }
    }
}

struct Capture(String);

impl Output for Capture {
    fn write(&mut self, seg: &str) -> Result<(), std::io::Error> {
        self.0.push_str(seg);
        Ok(())
    }
}

impl ClauseHelper {
    fn wrap(&self, body: &str) -> String {
        match self.kind {
            ClauseKind::Where => where_clause(body),
            ClauseKind::Set => set_clause(body),
        }
    }

    fn inline(&self, params: &[Json]) -> Result<String, RenderError> {
        if params.len() % 2 != 0 {
            return Err(helper_error(
                "inline clauses take (fragment, value) pairs",
            ));
        }

        let pieces: Vec<String> = params
            .chunks(2)
            .filter_map(|pair| {
                let fragment = match &pair[0] {
                    Json::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let operand = Operand::from_json(&pair[1]);
                if !self.dialect.is_generic() && !operand.is_truthy() {
                    return None;
                }
                Some(format!("{} {}", fragment.trim(), operand.render(self.dialect)))
            })
            .collect();

        let separator = match self.kind {
            ClauseKind::Where => " ",
            ClauseKind::Set => ", ",
        };
        Ok(self.wrap(&pieces.join(separator)))
    }
}

impl HelperDef for ClauseHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let clause = match h.template() {
            Some(template) => {
                let mut body = Capture(String::new());
                template.render(r, ctx, rc, &mut body)?;
                self.wrap(&body.0)
            }
            None => {
                let params: Vec<Json> = h.params().iter().map(|p| p.value().clone()).collect();
                self.inline(&params)?
            }
        };

        if !clause.is_empty() {
            out.write(" ")?;
            out.write(&clause)?;
            out.write("\n")?;
        }
        Ok(())
    }
}
