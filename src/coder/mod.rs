//! # Coder
//!
//! Lowers a fully checked program into a single C translation unit that
//! interoperates with the Lua VM's internal object representation.
//!
//! Emission works with `(prelude, rvalue)` pairs: the prelude is a block of
//! C statements carrying all side effects, and the rvalue is side-effect-free
//! C (a constant, a variable name or a simple read macro) that the caller may
//! repeat without changing evaluation order. Variables lower either to plain
//! C locals (`local_<name>`) or to slot addresses inside the module's globals
//! table; slot writes always go through the VM's tagged-assignment macros.
mod template;

use std::collections::HashMap;

use crate::ast::{
    Binding, Block, Decl, DeclId, Exp, ExpKind, FuncDecl, Position, Program, Stat, TopLevel, Unop,
    Var, VarDecl,
};
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::types::Type;

pub use template::render;

/// Generate the C translation unit for a checked program. The program is
/// annotated in place with global indices and entry-point names first.
pub fn generate(program: &mut Program, modname: &str) -> Result<String, Vec<Diagnostic>> {
    annotate(program);

    let globals = global_slots(program);
    let mut coder = Coder {
        program,
        globals,
        tmp: 0,
        errors: vec![],
    };
    let code = coder.emit_unit(modname);
    if coder.errors.is_empty() {
        Ok(code)
    } else {
        Err(coder.errors)
    }
}

/// Assign a contiguous global index to every value declaration in source
/// order and name the C entry points of every function.
fn annotate(program: &mut Program) {
    let mut next = 0usize;
    for toplevel in &mut program.toplevels {
        if toplevel.ignore() {
            continue;
        }
        match toplevel {
            TopLevel::Func(func) => {
                func.global_index = Some(next);
                next += 1;
                func.titan_entry = Some(format!("function_{}_titan", func.name));
                func.lua_entry = Some(format!("function_{}_lua", func.name));
            }
            TopLevel::Var(var) => {
                var.global_index = Some(next);
                next += 1;
            }
            TopLevel::Record(_) | TopLevel::Import(_) => {}
        }
    }
}

/// Map from declaration index to globals-table slot, for the declarations
/// that live in the globals table rather than in a C variable.
fn global_slots(program: &Program) -> HashMap<usize, usize> {
    let mut slots = HashMap::new();
    for toplevel in &program.toplevels {
        if let TopLevel::Var(var) = toplevel {
            if let Some(index) = var.global_index {
                slots.insert(var.decl.0, index);
            }
        }
    }
    slots
}

fn is_collectible(ty: &Type) -> bool {
    matches!(
        ty,
        Type::String | Type::Array(_) | Type::Function { .. } | Type::Record { .. }
    )
}

/// The C condition for "this value is truthy" under Lua rules: only `nil`
/// and `false` are falsy, so most types are constantly true.
fn truthy(ty: &Type, rvalue: &str) -> String {
    match ty {
        Type::Boolean => format!("({rvalue})"),
        Type::Nil => "0".to_owned(),
        _ => "1".to_owned(),
    }
}

/// The `ttis*` predicate matching a type's tag.
fn tag_predicate(ty: &Type) -> &'static str {
    match ty {
        Type::Nil => "ttisnil",
        Type::Boolean => "ttisboolean",
        Type::Integer => "ttisinteger",
        Type::Float => "ttisfloat",
        Type::String => "ttisstring",
        Type::Array(_) => "ttistable",
        Type::Function { .. } | Type::Record { .. } => "ttisnil",
    }
}

/// Read a native value out of a slot. The result is a repeatable,
/// side-effect-free expression.
fn slot_read(ty: &Type, addr: &str) -> String {
    match ty {
        Type::Nil => "0".to_owned(),
        Type::Boolean => format!("bvalue({addr})"),
        Type::Integer => format!("ivalue({addr})"),
        Type::Float => format!("fltvalue({addr})"),
        Type::String => format!("tsvalue({addr})"),
        Type::Array(_) => format!("hvalue({addr})"),
        Type::Function { .. } | Type::Record { .. } => "0".to_owned(),
    }
}

/// Whether a constant step expression is known to be non-negative. `None`
/// means the sign is only known at run time.
fn const_step_sign(exp: &Exp) -> Option<bool> {
    match &exp.kind {
        ExpKind::Integer(value) => Some(*value >= 0),
        ExpKind::Float(value) => Some(*value >= 0.0),
        ExpKind::Unop {
            op: Unop::Neg,
            exp,
        } => const_step_sign(exp).map(|sign| !sign),
        ExpKind::Cast { exp, .. } => const_step_sign(exp),
        _ => None,
    }
}

struct Coder<'p> {
    program: &'p Program,
    globals: HashMap<usize, usize>,
    /// Per-compilation temporary counter; names are never reused.
    tmp: usize,
    errors: Vec<Diagnostic>,
}

impl<'p> Coder<'p> {
    fn tmp_name(&mut self) -> String {
        self.tmp += 1;
        format!("tmp_{}", self.tmp)
    }

    fn decl(&self, id: DeclId) -> &'p Decl {
        self.program.decl(id)
    }

    fn decl_ty(&self, id: DeclId) -> Type {
        self.decl(id)
            .ty
            .clone()
            .expect("declaration was not visited by the checker")
    }

    fn not_implemented(&mut self, message: impl Into<String>, position: &Position) {
        self.errors.push(Diagnostic::new(
            ErrorKind::NotImplemented,
            message,
            position.to_owned(),
        ));
    }

    fn c_type(&mut self, ty: &Type, position: &Position) -> &'static str {
        match ty {
            Type::Nil | Type::Boolean => "int",
            Type::Integer => "lua_Integer",
            Type::Float => "lua_Number",
            Type::String => "TString *",
            Type::Array(_) => "Table *",
            Type::Function { .. } | Type::Record { .. } => {
                self.not_implemented(format!("values of type {ty} are not implemented"), position);
                "int"
            }
        }
    }

    /// Write a native value into a slot with the tagged-assignment macro for
    /// its type. GC barriers are the caller's business.
    fn set_value(&mut self, ty: &Type, addr: &str, rvalue: &str, position: &Position) -> String {
        match ty {
            Type::Nil => format!("setnilvalue({addr});\n"),
            Type::Boolean => format!("setbvalue({addr}, {rvalue});\n"),
            Type::Integer => format!("setivalue({addr}, {rvalue});\n"),
            Type::Float => format!("setfltvalue({addr}, {rvalue});\n"),
            Type::String => format!("setsvalue(L, {addr}, {rvalue});\n"),
            Type::Array(_) => format!("sethvalue(L, {addr}, {rvalue});\n"),
            Type::Function { .. } | Type::Record { .. } => {
                self.not_implemented(format!("values of type {ty} are not implemented"), position);
                String::new()
            }
        }
    }

    fn emit_unit(&mut self, modname: &str) -> String {
        let mut functions = String::new();
        let mut init = String::new();
        let mut module_table = String::new();
        let mut nglobals = 0usize;

        for toplevel in &self.program.toplevels {
            if toplevel.ignore() {
                continue;
            }
            match toplevel {
                TopLevel::Func(func) => {
                    nglobals += 1;
                    functions.push_str(&self.emit_func(func));
                    functions.push('\n');
                    init.push_str(&self.emit_func_slot(func));
                    if !func.is_local {
                        module_table.push_str(&self.emit_module_entry(func));
                    }
                }
                TopLevel::Var(var) => {
                    nglobals += 1;
                    init.push_str(&self.emit_var_init(var));
                }
                TopLevel::Record(_) | TopLevel::Import(_) => {}
            }
        }

        template::render(
            template::TRANSLATION_UNIT,
            &[
                ("MODNAME", modname.to_owned()),
                ("NGLOBALS", nglobals.to_string()),
                ("DEFINE_FUNCTIONS", functions),
                ("INITIALIZE_TOPLEVEL", init),
                ("CREATE_MODULE_TABLE", module_table),
            ],
        )
    }

    /// Emit both entry points of one function: the statically typed core
    /// entry point and the stack-based wrapper the VM calls.
    fn emit_func(&mut self, func: &FuncDecl) -> String {
        let titan_entry = func
            .titan_entry
            .as_deref()
            .expect("function without an entry-point name");
        let lua_entry = func
            .lua_entry
            .as_deref()
            .expect("function without an entry-point name");
        let Some(Type::Function { returns, .. }) = &func.ty else {
            panic!("function was not visited by the checker");
        };
        let ret = returns.first().cloned().unwrap_or(Type::Nil);
        let c_ret = self.c_type(&ret, &func.position);

        // Core entry point.
        let mut signature = String::from("lua_State *L");
        for &param in &func.params {
            let decl = self.decl(param);
            let ty = self.decl_ty(param);
            let cty = self.c_type(&ty, &decl.position);
            signature.push_str(&format!(", {cty} local_{}", decl.name));
        }

        let body = self.emit_stats(&func.block.stats);
        let mut titan = format!("static {c_ret} {titan_entry}({signature}) {{\n");
        titan.push_str("Table *_globals = hvalue(&clCvalue(L->ci->func)->upvalue[0]);\n");
        titan.push_str("(void) _globals;\n");
        titan.push_str(&body);
        if ret == Type::Nil {
            titan.push_str("return 0;\n");
        }
        titan.push_str("}\n\n");

        // Host entry point: pop and tag-check the arguments, call the core
        // entry point, push the result back.
        let nparams = func.params.len();
        let mut lua = format!("static int {lua_entry}(lua_State *L) {{\n");
        lua.push_str("lua_checkstack(L, LUA_MINSTACK);\n");
        lua.push_str("TValue *func = L->ci->func;\n");
        lua.push_str(&format!(
            "if ((L->top - func - 1) != {nparams}) {{\n\
             luaL_error(L, \"calling Titan function %s with %d arguments, but expected %d\", \
             \"{}\", (int)(L->top - func - 1), {nparams});\n}}\n",
            func.name
        ));

        let mut call_args = String::from("L");
        for (i, &param) in func.params.iter().enumerate() {
            let decl = self.decl(param);
            let ty = self.decl_ty(param);
            let cty = self.c_type(&ty, &decl.position);
            let line = decl.position.1;
            let slot = self.tmp_name();
            lua.push_str(&format!("TValue *{slot} = func + {};\n", i + 1));
            lua.push_str(&format!(
                "if (!{}({slot})) {{\n\
                 luaL_error(L, \"wrong type for argument %s at line %d, expected %s but found %s\", \
                 \"{}\", {line}, \"{ty}\", lua_typename(L, ttnov({slot})));\n}}\n",
                tag_predicate(&ty),
                decl.name
            ));
            lua.push_str(&format!(
                "{cty} local_{} = {};\n",
                decl.name,
                slot_read(&ty, &slot)
            ));
            call_args.push_str(&format!(", local_{}", decl.name));
        }

        match &ret {
            Type::Nil => {
                lua.push_str(&format!("{titan_entry}({call_args});\n"));
                lua.push_str("lua_pushnil(L);\n");
            }
            other => {
                let result = self.tmp_name();
                lua.push_str(&format!("{c_ret} {result} = {titan_entry}({call_args});\n"));
                let push = match other {
                    Type::Boolean => format!("lua_pushboolean(L, {result});\n"),
                    Type::Integer => format!("lua_pushinteger(L, {result});\n"),
                    Type::Float => format!("lua_pushnumber(L, {result});\n"),
                    Type::String => {
                        format!("setsvalue(L, L->top, {result});\napi_incr_top(L);\n")
                    }
                    Type::Array(_) => {
                        format!("sethvalue(L, L->top, {result});\napi_incr_top(L);\n")
                    }
                    Type::Function { .. } | Type::Record { .. } => {
                        // already diagnosed through c_type
                        "lua_pushnil(L);\n".to_owned()
                    }
                    Type::Nil => unreachable!(),
                };
                lua.push_str(&push);
            }
        }
        lua.push_str("return 1;\n}\n");

        titan + &lua
    }

    /// Build the closure for one function and store it in its globals slot.
    fn emit_func_slot(&mut self, func: &FuncDecl) -> String {
        let index = func.global_index.expect("function without a global index");
        let lua_entry = func
            .lua_entry
            .as_deref()
            .expect("function without an entry-point name");
        let closure = self.tmp_name();
        let slot = self.tmp_name();
        format!(
            "/* function {} */\n{{\n\
             CClosure *{closure} = luaF_newCclosure(L, 1);\n\
             {closure}->f = {lua_entry};\n\
             sethvalue(L, &{closure}->upvalue[0], _globals);\n\
             TValue *{slot} = &_globals->array[{index}];\n\
             setclCvalue(L, {slot}, {closure});\n\
             luaC_barrierback(L, _globals, {slot});\n}}\n",
            func.name
        )
    }

    fn emit_module_entry(&mut self, func: &FuncDecl) -> String {
        let index = func.global_index.expect("function without a global index");
        format!(
            "/* {0} */\n\
             setobj2s(L, L->top, &_globals->array[{index}]);\n\
             api_incr_top(L);\n\
             lua_setfield(L, -2, \"{0}\");\n",
            func.name
        )
    }

    /// Evaluate one top-level variable's initializer and store the value in
    /// its globals slot.
    fn emit_var_init(&mut self, var: &VarDecl) -> String {
        let decl = self.decl(var.decl);
        let ty = self.decl_ty(var.decl);
        let index = var.global_index.expect("variable without a global index");
        let (prelude, rvalue) = self.emit_exp(&var.value);
        let slot = self.tmp_name();
        let write = self.set_value(&ty, &slot, &rvalue, &var.position);
        let barrier = if is_collectible(&ty) {
            format!("luaC_barrierback(L, _globals, {slot});\n")
        } else {
            String::new()
        };
        format!(
            "/* {} */\n{{\n{prelude}TValue *{slot} = &_globals->array[{index}];\n{write}{barrier}}}\n",
            decl.name
        )
    }

    fn emit_block(&mut self, block: &Block) -> String {
        format!("{{\n{}}}\n", self.emit_stats(&block.stats))
    }

    fn emit_stats(&mut self, stats: &[Stat]) -> String {
        stats.iter().map(|stat| self.emit_stat(stat)).collect()
    }

    fn emit_stat(&mut self, stat: &Stat) -> String {
        match stat {
            Stat::Block(block) => self.emit_block(block),
            Stat::While { cond, block, .. } => {
                // The condition's prelude must run again on every iteration,
                // so the loop is an endless `for` with an early break.
                let (prelude, rvalue) = self.emit_exp(cond);
                let truthy = truthy(cond.typ(), &rvalue);
                let body = self.emit_stats(&block.stats);
                format!("for (;;) {{\n{prelude}if (!({truthy})) {{\nbreak;\n}}\n{body}}}\n")
            }
            Stat::Repeat { block, cond, .. } => {
                let body = self.emit_stats(&block.stats);
                let (prelude, rvalue) = self.emit_exp(cond);
                let truthy = truthy(cond.typ(), &rvalue);
                format!("for (;;) {{\n{body}{prelude}if ({truthy}) {{\nbreak;\n}}\n}}\n")
            }
            Stat::If {
                thens, otherwise, ..
            } => self.emit_if(thens, otherwise),
            Stat::For {
                decl,
                start,
                finish,
                step,
                block,
                ..
            } => self.emit_for(*decl, start, finish, step.as_ref(), block),
            Stat::Assign { var, exp, position } => self.emit_assign(var, exp, position),
            Stat::Decl { decl, exp, .. } => {
                let ty = self.decl_ty(*decl);
                let name = self.decl(*decl).name.clone();
                let cty = self.c_type(&ty, &self.decl(*decl).position);
                let (prelude, rvalue) = self.emit_exp(exp);
                format!("{prelude}{cty} local_{name} = {rvalue};\n")
            }
            Stat::Call { call, .. } => {
                let ExpKind::Call { func, args } = &call.kind else {
                    unreachable!("call statement without a call expression");
                };
                let (prelude, invocation) = self.emit_call(func, args, &call.position);
                format!("{prelude}{invocation};\n")
            }
            Stat::Return { exp: Some(exp), .. } => {
                let (prelude, rvalue) = self.emit_exp(exp);
                format!("{prelude}return {rvalue};\n")
            }
            Stat::Return { exp: None, .. } => "return 0;\n".to_owned(),
        }
    }

    /// `if`/`elseif` chains unfold right to left, so that each condition's
    /// prelude runs only when the earlier conditions were false.
    fn emit_if(&mut self, thens: &[(Exp, Block)], otherwise: &Option<Block>) -> String {
        let Some(((cond, block), rest)) = thens.split_first() else {
            return match otherwise {
                Some(block) => self.emit_stats(&block.stats),
                None => String::new(),
            };
        };
        let (prelude, rvalue) = self.emit_exp(cond);
        let truthy = truthy(cond.typ(), &rvalue);
        let body = self.emit_block(block);
        let rest = self.emit_if(rest, otherwise);
        if rest.is_empty() {
            format!("{prelude}if ({truthy}) {body}")
        } else {
            format!("{prelude}if ({truthy}) {body}else {{\n{rest}}}\n")
        }
    }

    fn emit_for(
        &mut self,
        decl: DeclId,
        start: &Exp,
        finish: &Exp,
        step: Option<&Exp>,
        block: &Block,
    ) -> String {
        let ty = self.decl_ty(decl);
        let is_integer = ty == Type::Integer;
        let cty = if is_integer { "lua_Integer" } else { "lua_Number" };

        // All three control expressions are evaluated exactly once, before
        // the loop runs.
        let (start_prelude, start_rvalue) = self.emit_exp(start);
        let (finish_prelude, finish_rvalue) = self.emit_exp(finish);
        let start_tmp = self.tmp_name();
        let finish_tmp = self.tmp_name();
        let mut code = format!(
            "{start_prelude}{cty} {start_tmp} = {start_rvalue};\n\
             {finish_prelude}{cty} {finish_tmp} = {finish_rvalue};\n"
        );

        let (step_text, step_sign) = match step {
            None => ("1".to_owned(), Some(true)),
            Some(step) => {
                let sign = const_step_sign(step);
                let (step_prelude, step_rvalue) = self.emit_exp(step);
                let step_tmp = self.tmp_name();
                code.push_str(&format!("{step_prelude}{cty} {step_tmp} = {step_rvalue};\n"));
                (step_tmp, sign)
            }
        };

        let counter = self.tmp_name();
        let continuation = match step_sign {
            Some(true) => format!("{counter} <= {finish_tmp}"),
            Some(false) => format!("{counter} >= {finish_tmp}"),
            None => format!(
                "({step_text} >= 0 ? {counter} <= {finish_tmp} : {counter} >= {finish_tmp})"
            ),
        };
        // Integer loops step with the wrap-around macro, like the host VM.
        let increment = if is_integer {
            format!("{counter} = intop(+, {counter}, {step_text})")
        } else {
            format!("{counter} = {counter} + {step_text}")
        };

        let name = self.decl(decl).name.clone();
        let body = self.emit_stats(&block.stats);
        code.push_str(&format!(
            "for ({cty} {counter} = {start_tmp}; {continuation}; {increment}) {{\n\
             {cty} local_{name} = {counter};\n\
             (void) local_{name};\n\
             {body}}}\n"
        ));
        code
    }

    fn emit_assign(&mut self, var: &Var, exp: &Exp, position: &Position) -> String {
        match var {
            Var::Name {
                binding: Some(Binding::Decl(id)),
                ..
            } => {
                let (prelude, rvalue) = self.emit_exp(exp);
                match self.globals.get(&id.0).copied() {
                    Some(index) => {
                        let ty = self.decl_ty(*id);
                        let slot = self.tmp_name();
                        let write = self.set_value(&ty, &slot, &rvalue, position);
                        let barrier = if is_collectible(&ty) {
                            format!("luaC_barrierback(L, _globals, {slot});\n")
                        } else {
                            String::new()
                        };
                        format!(
                            "{prelude}{{\nTValue *{slot} = &_globals->array[{index}];\n{write}{barrier}}}\n"
                        )
                    }
                    None => {
                        let name = self.decl(*id).name.clone();
                        format!("{prelude}local_{name} = {rvalue};\n")
                    }
                }
            }
            Var::Name { .. } => unreachable!("assignment to a non-variable survived the checker"),
            Var::Bracket {
                exp: table, index, ..
            } => {
                let elem = match table.typ() {
                    Type::Array(elem) => (**elem).clone(),
                    other => unreachable!("indexing a {other} survived the checker"),
                };
                let (table_prelude, table_rvalue) = self.emit_exp(table);
                let (index_prelude, index_rvalue) = self.emit_exp(index);
                let (value_prelude, value_rvalue) = self.emit_exp(exp);
                let value = self.tmp_name();
                let set = self.set_value(&elem, &format!("&{value}"), &value_rvalue, position);
                let barrier = if is_collectible(&elem) {
                    format!("luaC_barrierback(L, {table_rvalue}, &{value});\n")
                } else {
                    String::new()
                };
                format!(
                    "{table_prelude}{index_prelude}{value_prelude}{{\n\
                     TValue {value};\n{set}\
                     luaH_setint(L, {table_rvalue}, {index_rvalue}, &{value});\n{barrier}}}\n"
                )
            }
            Var::Dot { position, .. } => {
                self.not_implemented("record field assignment is not implemented", position);
                String::new()
            }
        }
    }

    fn emit_call(&mut self, func: &Exp, args: &[Exp], position: &Position) -> (String, String) {
        let ExpKind::Var(Var::Name {
            binding: Some(Binding::Func(index)),
            ..
        }) = &func.kind
        else {
            self.not_implemented("calling first-class functions is not implemented", position);
            return (String::new(), "0".to_owned());
        };
        let TopLevel::Func(callee) = &self.program.toplevels[*index] else {
            unreachable!("function binding does not point at a function");
        };
        let entry = callee
            .titan_entry
            .clone()
            .expect("callee without an entry-point name");

        let mut prelude = String::new();
        let mut invocation = format!("{entry}(L");
        for arg in args {
            let (arg_prelude, arg_rvalue) = self.emit_exp(arg);
            prelude.push_str(&arg_prelude);
            invocation.push_str(&format!(", {arg_rvalue}"));
        }
        invocation.push(')');
        (prelude, invocation)
    }

    /// Emit one expression as a `(prelude, rvalue)` pair.
    fn emit_exp(&mut self, exp: &Exp) -> (String, String) {
        match &exp.kind {
            ExpKind::Nil => (String::new(), "0".to_owned()),
            ExpKind::Bool(value) => {
                let text = if *value { "1" } else { "0" };
                (String::new(), text.to_owned())
            }
            ExpKind::Integer(value) => {
                let text = if *value == i64::MIN {
                    "(-9223372036854775807 - 1)".to_owned()
                } else {
                    value.to_string()
                };
                (String::new(), text)
            }
            ExpKind::Float(value) => {
                let text = if value.is_finite() {
                    format!("{value:?}")
                } else {
                    "HUGE_VAL".to_owned()
                };
                (String::new(), text)
            }
            ExpKind::Str(_) => {
                self.not_implemented("string literals are not implemented", &exp.position);
                (String::new(), "0".to_owned())
            }
            ExpKind::Var(var) => self.emit_var_read(var),
            ExpKind::Unop { op, exp: operand } => {
                let (prelude, rvalue) = self.emit_exp(operand);
                let text = match op {
                    Unop::Not => format!("(!({}))", truthy(operand.typ(), &rvalue)),
                    Unop::Neg => {
                        if operand.typ() == &Type::Integer {
                            format!("intop(-, 0, {rvalue})")
                        } else {
                            format!("(-({rvalue}))")
                        }
                    }
                    Unop::Len => format!("((lua_Integer)luaH_getn({rvalue}))"),
                    Unop::BNot => format!("intop(^, ~(lua_Unsigned)0, {rvalue})"),
                };
                (prelude, text)
            }
            ExpKind::Binop { op, lhs, rhs } => self.emit_binop(*op, lhs, rhs, &exp.position),
            ExpKind::Call { func, args } => {
                let ret = exp.typ().clone();
                let cty = self.c_type(&ret, &exp.position);
                let (mut prelude, invocation) = self.emit_call(func, args, &exp.position);
                let result = self.tmp_name();
                prelude.push_str(&format!("{cty} {result} = {invocation};\n"));
                (prelude, result)
            }
            ExpKind::Initlist { exps } => {
                let elem = match exp.typ() {
                    Type::Array(elem) => (**elem).clone(),
                    other => unreachable!("array initializer typed {other}"),
                };
                let table = self.tmp_name();
                let mut prelude = format!(
                    "Table *{table} = luaH_new(L);\n\
                     sethvalue(L, L->top, {table});\n\
                     api_incr_top(L);\n\
                     luaH_resize(L, {table}, {}, 0);\n",
                    exps.len()
                );
                for (i, element) in exps.iter().enumerate() {
                    let (element_prelude, element_rvalue) = self.emit_exp(element);
                    let value = self.tmp_name();
                    let set = self.set_value(
                        &elem,
                        &format!("&{value}"),
                        &element_rvalue,
                        &element.position,
                    );
                    prelude.push_str(&format!(
                        "{element_prelude}{{\nTValue {value};\n{set}\
                         luaH_setint(L, {table}, {}, &{value});\n",
                        i + 1
                    ));
                    if is_collectible(&elem) {
                        prelude.push_str(&format!("luaC_barrierback(L, {table}, &{value});\n"));
                    }
                    prelude.push_str("}\n");
                }
                prelude.push_str("L->top--;\n");
                (prelude, table)
            }
            ExpKind::Concat { .. } => {
                self.not_implemented("string concatenation is not implemented", &exp.position);
                (String::new(), "0".to_owned())
            }
            ExpKind::Cast { exp: inner, target } => {
                let (prelude, rvalue) = self.emit_exp(inner);
                if inner.typ() == target {
                    (prelude, rvalue)
                } else if inner.typ() == &Type::Integer && target == &Type::Float {
                    (prelude, format!("((lua_Number)({rvalue}))"))
                } else {
                    unreachable!("cast from {} to {target} survived the checker", inner.typ());
                }
            }
        }
    }

    fn emit_binop(
        &mut self,
        op: crate::ast::Binop,
        lhs: &Exp,
        rhs: &Exp,
        position: &Position,
    ) -> (String, String) {
        use crate::ast::Binop;

        // Short circuits first; they are the only operators whose right
        // prelude runs conditionally.
        if op == Binop::And || op == Binop::Or {
            let (lhs_prelude, lhs_rvalue) = self.emit_exp(lhs);
            let (rhs_prelude, rhs_rvalue) = self.emit_exp(rhs);
            let lhs_truthy = truthy(lhs.typ(), &lhs_rvalue);
            let rhs_truthy = truthy(rhs.typ(), &rhs_rvalue);
            let result = self.tmp_name();
            let guard = if op == Binop::And {
                format!("if ({result})")
            } else {
                format!("if (!{result})")
            };
            let prelude = format!(
                "{lhs_prelude}int {result} = {lhs_truthy};\n\
                 {guard} {{\n{rhs_prelude}{result} = {rhs_truthy};\n}}\n"
            );
            return (prelude, result);
        }

        let (lhs_prelude, lhs_rvalue) = self.emit_exp(lhs);
        let (rhs_prelude, rhs_rvalue) = self.emit_exp(rhs);
        let mut prelude = lhs_prelude + &rhs_prelude;

        let operand_ty = lhs.typ().clone();
        let text = match op {
            Binop::Eq | Binop::Ne => {
                if matches!(operand_ty, Type::String) {
                    self.not_implemented("string comparison is not implemented", position);
                    "0".to_owned()
                } else {
                    let c_op = if op == Binop::Eq { "==" } else { "!=" };
                    format!("(({lhs_rvalue}) {c_op} ({rhs_rvalue}))")
                }
            }
            Binop::Lt | Binop::Gt | Binop::Le | Binop::Ge => {
                if matches!(operand_ty, Type::String) {
                    self.not_implemented("string comparison is not implemented", position);
                    "0".to_owned()
                } else {
                    let c_op = match op {
                        Binop::Lt => "<",
                        Binop::Gt => ">",
                        Binop::Le => "<=",
                        _ => ">=",
                    };
                    format!("(({lhs_rvalue}) {c_op} ({rhs_rvalue}))")
                }
            }
            Binop::Add | Binop::Sub | Binop::Mul => {
                let c_op = match op {
                    Binop::Add => "+",
                    Binop::Sub => "-",
                    _ => "*",
                };
                if lhs.typ() == &Type::Integer && rhs.typ() == &Type::Integer {
                    // Wrap-around two's-complement arithmetic, like the VM.
                    format!("intop({c_op}, {lhs_rvalue}, {rhs_rvalue})")
                } else {
                    format!("(({lhs_rvalue}) {c_op} ({rhs_rvalue}))")
                }
            }
            Binop::Div => format!("(({lhs_rvalue}) / ({rhs_rvalue}))"),
            Binop::Pow => format!("pow({lhs_rvalue}, {rhs_rvalue})"),
            // The host's modulo and floor division do not match C's; go
            // through the VM runtime.
            Binop::IntDiv => {
                let result = self.tmp_name();
                prelude.push_str(&format!(
                    "lua_Integer {result} = luaV_div(L, {lhs_rvalue}, {rhs_rvalue});\n"
                ));
                result
            }
            Binop::Mod => {
                let result = self.tmp_name();
                prelude.push_str(&format!(
                    "lua_Integer {result} = luaV_mod(L, {lhs_rvalue}, {rhs_rvalue});\n"
                ));
                result
            }
            Binop::BAnd => format!("intop(&, {lhs_rvalue}, {rhs_rvalue})"),
            Binop::BOr => format!("intop(|, {lhs_rvalue}, {rhs_rvalue})"),
            Binop::BXor => format!("intop(^, {lhs_rvalue}, {rhs_rvalue})"),
            Binop::Shl => format!("intop(<<, {lhs_rvalue}, {rhs_rvalue})"),
            Binop::Shr => format!("intop(>>, {lhs_rvalue}, {rhs_rvalue})"),
            Binop::And | Binop::Or => unreachable!(),
        };
        (prelude, text)
    }

    fn emit_var_read(&mut self, var: &Var) -> (String, String) {
        match var {
            Var::Name {
                binding: Some(Binding::Decl(id)),
                ..
            } => match self.globals.get(&id.0).copied() {
                Some(index) => {
                    let ty = self.decl_ty(*id);
                    let addr = format!("&_globals->array[{index}]");
                    (String::new(), slot_read(&ty, &addr))
                }
                None => {
                    let name = self.decl(*id).name.clone();
                    (String::new(), format!("local_{name}"))
                }
            },
            Var::Name {
                binding: Some(Binding::Func(_)),
                position,
                ..
            } => {
                self.not_implemented("first-class functions are not implemented", position);
                (String::new(), "0".to_owned())
            }
            Var::Name { .. } => unreachable!("unresolved name survived the checker"),
            Var::Bracket {
                exp: table,
                index,
                position,
            } => {
                let elem = match table.typ() {
                    Type::Array(elem) => (**elem).clone(),
                    other => unreachable!("indexing a {other} survived the checker"),
                };
                let (table_prelude, table_rvalue) = self.emit_exp(table);
                let (index_prelude, index_rvalue) = self.emit_exp(index);
                let cty = self.c_type(&elem, position);
                let slot = self.tmp_name();
                let value = self.tmp_name();
                let line = position.1;
                let prelude = format!(
                    "{table_prelude}{index_prelude}\
                     const TValue *{slot} = luaH_getint({table_rvalue}, {index_rvalue});\n\
                     if (!{}({slot})) {{\n\
                     luaL_error(L, \"wrong type in array element at line %d, expected %s\", \
                     {line}, \"{elem}\");\n}}\n\
                     {cty} {value} = {};\n",
                    tag_predicate(&elem),
                    slot_read(&elem, &slot)
                );
                (prelude, value)
            }
            Var::Dot { position, .. } => {
                self.not_implemented("record field access is not implemented", position);
                (String::new(), "0".to_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_program;
    use crate::{checker, scope_analysis};

    fn generated(source: &str) -> (Program, String) {
        let mut program = parse_program("test.pln", source).expect("program should parse");
        assert!(scope_analysis::analyze(&mut program).is_empty());
        let errors = checker::check(&mut program);
        assert!(errors.is_empty(), "checker errors: {errors:?}");
        let code = generate(&mut program, "test").expect("codegen should succeed");
        (program, code)
    }

    fn codegen_errors(source: &str) -> Vec<Diagnostic> {
        let mut program = parse_program("test.pln", source).expect("program should parse");
        assert!(scope_analysis::analyze(&mut program).is_empty());
        assert!(checker::check(&mut program).is_empty());
        generate(&mut program, "test").expect_err("codegen should fail")
    }

    #[test]
    fn an_empty_module_still_opens() {
        let (_, code) = generated("");
        assert!(code.contains("int luaopen_test(lua_State *L)"));
        assert!(code.contains("luaH_resize(L, _globals, 0, 0);"));
    }

    #[test]
    fn functions_get_both_entry_points() {
        let (program, code) = generated(
            "local function add(x: integer, y: integer): integer return x + y end",
        );
        let TopLevel::Func(func) = &program.toplevels[0] else {
            panic!("expected a function");
        };
        assert_eq!(func.titan_entry.as_deref(), Some("function_add_titan"));
        assert_eq!(func.lua_entry.as_deref(), Some("function_add_lua"));
        assert!(code.contains(
            "static lua_Integer function_add_titan(lua_State *L, lua_Integer local_x, lua_Integer local_y)"
        ));
        assert!(code.contains("static int function_add_lua(lua_State *L)"));
        // Integer addition wraps through the VM macro.
        assert!(code.contains("intop(+, local_x, local_y)"));
        // The wrapper tag-checks its arguments with the mandated message.
        assert!(code.contains("wrong type for argument %s at line %d, expected %s but found %s"));
        assert!(code.contains("\"x\", 1, \"integer\""));
    }

    #[test]
    fn mangled_names_never_collide() {
        let (program, _) = generated(
            "local function f() end
             local function g() end",
        );
        let entries: Vec<_> = program
            .toplevels
            .iter()
            .filter_map(|t| match t {
                TopLevel::Func(f) => Some(f.titan_entry.clone().unwrap()),
                _ => None,
            })
            .collect();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0], entries[1]);
    }

    #[test]
    fn global_indices_are_contiguous() {
        let (program, code) = generated(
            "local function f() end
             local x = 1
             local function g() end
             local y = 2.0",
        );
        let indices: Vec<_> = program
            .toplevels
            .iter()
            .map(|t| match t {
                TopLevel::Func(f) => f.global_index.unwrap(),
                TopLevel::Var(v) => v.global_index.unwrap(),
                _ => panic!("unexpected top-level"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(code.contains("luaH_resize(L, _globals, 4, 0);"));
    }

    #[test]
    fn only_public_functions_land_in_the_module_table() {
        let (_, code) = generated(
            "local function hidden() end
             function visible() end",
        );
        assert!(code.contains("lua_setfield(L, -2, \"visible\");"));
        assert!(!code.contains("lua_setfield(L, -2, \"hidden\");"));
    }

    #[test]
    fn float_arithmetic_stays_plain() {
        let (_, code) = generated("local function f(x: float): float return x + 1.0 end");
        assert!(code.contains("((local_x) + (1.0))"));
        assert!(!code.contains("intop(+, local_x"));
    }

    #[test]
    fn modulo_goes_through_the_vm() {
        let (_, code) =
            generated("local function f(x: integer): integer return x % 3 end");
        assert!(code.contains("luaV_mod(L, local_x, 3)"));
    }

    #[test]
    fn while_loops_reevaluate_their_condition() {
        let (_, code) = generated(
            "local function f(xs: {integer}): integer
                local i = 1
                while xs[i] > 0 do
                    i = i + 1
                end
                return i
            end",
        );
        assert!(code.contains("for (;;) {"));
        assert!(code.contains("luaH_getint(local_xs, local_i)"));
        assert!(code.contains("break;"));
    }

    #[test]
    fn integer_for_loops_use_the_wrapping_increment() {
        let (_, code) = generated(
            "local function sum(n: integer): integer
                local acc = 0
                for i = 1, n do
                    acc = acc + i
                end
                return acc
            end",
        );
        assert!(code.contains("intop(+, tmp_"));
        assert!(code.contains("local_i = tmp_"));
    }

    #[test]
    fn a_negative_constant_step_counts_down() {
        let (_, code) = generated(
            "local function f(): integer
                local acc = 0
                for i = 10, 1, -1 do
                    acc = acc + i
                end
                return acc
            end",
        );
        assert!(code.contains(">= tmp_"), "{code}");
    }

    #[test]
    fn globals_live_in_table_slots() {
        let (_, code) = generated(
            "local counter = 0
             local function bump(): integer
                counter = counter + 1
                return counter
             end",
        );
        // read through the slot, write through the tagged macro
        assert!(code.contains("ivalue(&_globals->array[0])"));
        assert!(code.contains("setivalue(tmp_"));
    }

    #[test]
    fn array_literals_resize_and_anchor() {
        let (_, code) = generated("local xs: {integer} = {1, 2, 3}");
        assert!(code.contains("luaH_new(L)"));
        assert!(code.contains("luaH_resize(L, tmp_1, 3, 0);"));
        assert!(code.contains("luaH_setint(L, tmp_1, 1, &tmp_2);"));
    }

    #[test]
    fn short_circuits_guard_the_right_operand() {
        let (_, code) = generated(
            "local function f(xs: {integer}, i: integer): boolean
                return i > 0 and xs[i] > 0
            end",
        );
        // The indexing prelude must sit inside the guard.
        let guard = code.find("if (tmp_").expect("missing guard");
        let index = code.find("luaH_getint").expect("missing index read");
        assert!(guard < index, "{code}");
    }

    #[test]
    fn concatenation_is_reserved() {
        let errors = codegen_errors(
            "local function f(s: string): string return s .. s end",
        );
        assert!(errors
            .iter()
            .any(|e| e.kind == ErrorKind::NotImplemented));
    }

    #[test]
    fn casts_lower_to_plain_conversions() {
        let (_, code) = generated("local function f(x: integer): float return x + 0.5 end");
        assert!(code.contains("((lua_Number)(local_x))"));
    }

    #[test]
    fn the_binary_search_module_compiles() {
        let (_, code) = generated(
            "local function binsearch(xs: {integer}, v: integer): integer
                local lo: integer = 1
                local hi: integer = #xs
                local steps: integer = 0
                while hi >= lo do
                    local mid: integer = lo + (hi - lo) // 2
                    steps = steps + 1
                    local m = xs[mid]
                    if m == v then
                        return steps
                    elseif m < v then
                        lo = mid + 1
                    else
                        hi = mid - 1
                    end
                end
                return steps
            end

            function test(xs: {integer}, n: integer): integer
                local count: integer = 0
                for i = 1, n do
                    local probes = binsearch(xs, i)
                    if probes ~= 22 then
                        count = count + 1
                    end
                end
                return count
            end",
        );
        assert!(code.contains("function_binsearch_titan"));
        assert!(code.contains("function_test_titan"));
        assert!(code.contains("luaV_div(L, intop(-, local_hi, local_lo), 2)"));
        assert!(code.contains("((lua_Integer)luaH_getn(local_xs))"));
        // Only the public function lands in the module table.
        assert!(code.contains("lua_setfield(L, -2, \"test\");"));
        assert!(!code.contains("lua_setfield(L, -2, \"binsearch\");"));
    }

    #[test]
    fn temporaries_are_never_reused() {
        let (_, code) = generated(
            "local function f(a: integer, b: integer): integer
                return a % 2 + b % 3
            end",
        );
        let first = code.find("lua_Integer tmp_").expect("expected temporaries");
        let rest = &code[first + 16..];
        assert!(rest.contains("lua_Integer tmp_"), "{code}");
        assert!(code.contains("luaV_mod(L, local_a, 2)"));
        assert!(code.contains("luaV_mod(L, local_b, 3)"));
    }
}
