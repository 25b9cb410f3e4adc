//! C scaffolding for the generated translation unit.
//!
//! The scaffold is a fixed text with named `${HOLE}` holes. Rendering fails
//! loudly on a hole without a value and on a value without a hole, so a
//! misspelled substitution key cannot produce silently broken C.

/// The whole translation unit. The generated module interoperates with the
/// Lua VM's internal object representation, so next to the public headers it
/// includes the internal ones it needs for tables, closures and tagged
/// values.
pub const TRANSLATION_UNIT: &str = r#"/* Generated by the Titan compiler; do not edit by hand. */

#include <lua.h>
#include <lauxlib.h>
#include <lualib.h>

#include <math.h>

#include "lapi.h"
#include "lfunc.h"
#include "lgc.h"
#include "lobject.h"
#include "lstate.h"
#include "ltable.h"
#include "lvm.h"

#ifdef __clang__
#pragma clang diagnostic ignored "-Wparentheses-equality"
#endif

${DEFINE_FUNCTIONS}

int init_${MODNAME}(lua_State *L) {
Table *_globals = hvalue(&clCvalue(L->ci->func)->upvalue[0]);
(void) _globals;
${INITIALIZE_TOPLEVEL}
return 0;
}

int luaopen_${MODNAME}(lua_State *L) {
lua_checkstack(L, 4);
Table *_globals = luaH_new(L);
/* anchor the globals table while the module is being set up */
sethvalue(L, L->top, _globals);
api_incr_top(L);
luaH_resize(L, _globals, ${NGLOBALS}, 0);
/* the initializer runs as a closure whose single upvalue is the globals
   table */
sethvalue(L, L->top, _globals);
api_incr_top(L);
lua_pushcclosure(L, init_${MODNAME}, 1);
lua_call(L, 0, 0);
lua_newtable(L);
${CREATE_MODULE_TABLE}
lua_remove(L, -2);
return 1;
}
"#;

/// Replace every `${NAME}` hole with its substitution.
///
/// Panics on an unknown or unused substitution; both are compiler bugs, not
/// user errors.
pub fn render(template: &str, substitutions: &[(&str, String)]) -> String {
    let mut used = vec![false; substitutions.len()];
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').expect("unterminated hole in template");
        let name = &after[..end];
        let index = substitutions
            .iter()
            .position(|(hole, _)| *hole == name)
            .unwrap_or_else(|| panic!("no substitution for template hole '{name}'"));
        out.push_str(&substitutions[index].1);
        used[index] = true;
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    for ((name, _), used) in substitutions.iter().zip(used) {
        assert!(used, "substitution '{name}' matches no template hole");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_holes() {
        let rendered = render(
            "a ${X} b ${Y} c ${X}",
            &[("X", "1".to_owned()), ("Y", "2".to_owned())],
        );
        assert_eq!(rendered, "a 1 b 2 c 1");
    }

    #[test]
    #[should_panic(expected = "no substitution for template hole 'Y'")]
    fn missing_substitutions_panic() {
        render("${Y}", &[("X", "1".to_owned())]);
    }

    #[test]
    #[should_panic(expected = "matches no template hole")]
    fn unused_substitutions_panic() {
        render("${X}", &[("X", "1".to_owned()), ("Z", "3".to_owned())]);
    }

    #[test]
    fn the_translation_unit_has_the_expected_holes() {
        let rendered = render(
            TRANSLATION_UNIT,
            &[
                ("MODNAME", "m".to_owned()),
                ("NGLOBALS", "0".to_owned()),
                ("DEFINE_FUNCTIONS", String::new()),
                ("INITIALIZE_TOPLEVEL", String::new()),
                ("CREATE_MODULE_TABLE", String::new()),
            ],
        );
        assert!(rendered.contains("int luaopen_m(lua_State *L)"));
        assert!(rendered.contains("int init_m(lua_State *L)"));
    }
}
