//! Expression evaluation over a [`VarContext`].

use chrono::Duration;
use dft_types::time::format_timestamp;

use crate::template::context::VarContext;
use crate::template::parser::{Arg, BinOp, Expr};
use crate::template::value::TemplateValue;

pub(crate) fn eval(expr: &Expr, ctx: &VarContext) -> Result<TemplateValue, String> {
    match expr {
        Expr::Lit(value) => Ok(value.clone()),
        Expr::Var(name) => lookup(name, ctx),
        Expr::Call { name, args } => call(name, args, ctx),
        Expr::Method { recv, name, args } => method(recv, name, args, ctx),
        Expr::BinOp { op, lhs, rhs } => binop(*op, eval(lhs, ctx)?, eval(rhs, ctx)?),
        Expr::Neg(inner) => match eval(inner, ctx)? {
            TemplateValue::Int(i) => Ok(TemplateValue::Int(-i)),
            TemplateValue::Float(f) => Ok(TemplateValue::Float(-f)),
            TemplateValue::Duration(d) => Ok(TemplateValue::Duration(-d)),
            other => Err(format!("cannot negate {}", other.type_name())),
        },
    }
}

fn lookup(name: &str, ctx: &VarContext) -> Result<TemplateValue, String> {
    ctx.lookup(name).cloned().ok_or_else(|| {
        format!(
            "unknown variable '{}' (searched {})",
            name,
            join_searched(ctx)
        )
    })
}

fn join_searched(ctx: &VarContext) -> String {
    let keys = ctx.searched_keys();
    if keys.is_empty() {
        "no declared variables".to_string()
    } else {
        keys.join(", ")
    }
}

fn call(name: &str, args: &[Arg], ctx: &VarContext) -> Result<TemplateValue, String> {
    match name {
        "var" => {
            let name = positional_str(name, args, 0)?;
            lookup(&name, ctx)
        }
        "env_var" => {
            let key = positional_str(name, args, 0)?;
            match std::env::var(&key) {
                Ok(value) => Ok(TemplateValue::Str(value)),
                Err(_) => match args.get(1) {
                    Some(default) => eval(&default.value, ctx),
                    None => Err(format!("environment variable '{key}' is not set")),
                },
            }
        }
        "today" => {
            expect_arity(name, args, 0)?;
            Ok(TemplateValue::Timestamp(midnight(ctx)))
        }
        "yesterday" => {
            expect_arity(name, args, 0)?;
            Ok(TemplateValue::Timestamp(midnight(ctx) - Duration::days(1)))
        }
        "now" => {
            expect_arity(name, args, 0)?;
            Ok(TemplateValue::Timestamp(ctx.now()))
        }
        "days_ago" => {
            let n = positional_int(name, args, 0)?;
            Ok(TemplateValue::Timestamp(midnight(ctx) - Duration::days(n)))
        }
        "timedelta" => timedelta(args, ctx),
        other => Err(format!("unknown function '{other}'")),
    }
}

fn timedelta(args: &[Arg], ctx: &VarContext) -> Result<TemplateValue, String> {
    let mut total = Duration::zero();
    if args.is_empty() {
        return Err("timedelta requires at least one of hours, days, minutes".into());
    }
    for arg in args {
        let key = arg
            .name
            .as_deref()
            .ok_or("timedelta takes keyword arguments only")?;
        let amount = match eval(&arg.value, ctx)? {
            TemplateValue::Int(i) => i,
            other => {
                return Err(format!(
                    "timedelta {key} must be an integer, found {}",
                    other.type_name()
                ))
            }
        };
        total = total
            + match key {
                "days" => Duration::days(amount),
                "hours" => Duration::hours(amount),
                "minutes" => Duration::minutes(amount),
                other => return Err(format!("timedelta does not accept '{other}'")),
            };
    }
    Ok(TemplateValue::Duration(total))
}

fn method(
    recv: &Expr,
    name: &str,
    args: &[Arg],
    ctx: &VarContext,
) -> Result<TemplateValue, String> {
    // `state` is an object, not a variable; resolve its methods first.
    if let Expr::Var(var) = recv {
        if var == "state" {
            return state_method(name, args, ctx);
        }
    }

    let receiver = eval(recv, ctx)?;
    match (&receiver, name) {
        (TemplateValue::Timestamp(ts), "strftime") => {
            let fmt = positional_str(name, args, 0)?;
            Ok(TemplateValue::Str(ts.format(&fmt).to_string()))
        }
        (TemplateValue::Timestamp(ts), "isoformat") => {
            expect_arity(name, args, 0)?;
            Ok(TemplateValue::Str(format_timestamp(*ts)))
        }
        (other, name) => Err(format!(
            "{} has no method '{name}'",
            other.type_name()
        )),
    }
}

fn state_method(name: &str, args: &[Arg], ctx: &VarContext) -> Result<TemplateValue, String> {
    if name != "get" {
        return Err(format!("state has no method '{name}'"));
    }
    let key = positional_str(name, args, 0)?;
    match ctx.state().get(&key) {
        Some(value) => Ok(TemplateValue::from_json(value)),
        None => match args.get(1) {
            Some(default) => eval(&default.value, ctx),
            None => Err(format!("state has no key '{key}'")),
        },
    }
}

fn binop(op: BinOp, lhs: TemplateValue, rhs: TemplateValue) -> Result<TemplateValue, String> {
    use TemplateValue::{Duration as Dur, Float, Int, Timestamp};
    match (op, lhs, rhs) {
        (BinOp::Sub, Timestamp(ts), Dur(d)) => Ok(Timestamp(ts - d)),
        (BinOp::Add, Timestamp(ts), Dur(d)) | (BinOp::Add, Dur(d), Timestamp(ts)) => {
            Ok(Timestamp(ts + d))
        }
        (BinOp::Sub, Timestamp(a), Timestamp(b)) => Ok(Dur(a - b)),
        (BinOp::Add, Dur(a), Dur(b)) => Ok(Dur(a + b)),
        (BinOp::Sub, Dur(a), Dur(b)) => Ok(Dur(a - b)),
        (BinOp::Add, Int(a), Int(b)) => Ok(Int(a + b)),
        (BinOp::Sub, Int(a), Int(b)) => Ok(Int(a - b)),
        (BinOp::Add, Float(a), Float(b)) => Ok(Float(a + b)),
        (BinOp::Sub, Float(a), Float(b)) => Ok(Float(a - b)),
        (BinOp::Add, Int(a), Float(b)) | (BinOp::Add, Float(b), Int(a)) => {
            Ok(Float(a as f64 + b))
        }
        (BinOp::Sub, Int(a), Float(b)) => Ok(Float(a as f64 - b)),
        (BinOp::Sub, Float(a), Int(b)) => Ok(Float(a - b as f64)),
        (op, lhs, rhs) => Err(format!(
            "unsupported operation: {} {} {}",
            lhs.type_name(),
            match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
            },
            rhs.type_name()
        )),
    }
}

fn midnight(ctx: &VarContext) -> chrono::NaiveDateTime {
    ctx.now()
        .date()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
}

fn expect_arity(name: &str, args: &[Arg], arity: usize) -> Result<(), String> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(format!(
            "{name}() takes {arity} argument(s), found {}",
            args.len()
        ))
    }
}

fn positional_str(func: &str, args: &[Arg], index: usize) -> Result<String, String> {
    match args.get(index) {
        Some(Arg {
            name: None,
            value: Expr::Lit(TemplateValue::Str(s)),
        }) => Ok(s.clone()),
        Some(_) => Err(format!(
            "{func}() argument {} must be a string literal",
            index + 1
        )),
        None => Err(format!("{func}() is missing argument {}", index + 1)),
    }
}

fn positional_int(func: &str, args: &[Arg], index: usize) -> Result<i64, String> {
    match args.get(index) {
        Some(Arg {
            name: None,
            value: Expr::Lit(TemplateValue::Int(i)),
        }) => Ok(*i),
        Some(_) => Err(format!(
            "{func}() argument {} must be an integer literal",
            index + 1
        )),
        None => Err(format!("{func}() is missing argument {}", index + 1)),
    }
}
