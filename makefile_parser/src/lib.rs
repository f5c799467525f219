mod model;

pub use crate::model::{MakefileInfo, Target};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// 变量展开的最大轮数，防止循环引用
const MAX_EXPAND_ROUNDS: usize = 16;

static RE_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+|override\s+)?([A-Za-z0-9_.-]+)\s*(::=|:=|\?=|\+=|=)\s*(.*)$")
        .expect("assignment pattern")
});

static RE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\(([A-Za-z0-9_.-]+)\)|\{([A-Za-z0-9_.-]+)\})").expect("placeholder pattern")
});

/// 展开多行续行
pub fn unfold_multiline(lines: &[String]) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    for l in lines {
        let trimmed = l.trim_end();
        if let Some(head) = trimmed.strip_suffix('\\') {
            current.push_str(head);
            current.push(' ');
        } else {
            current.push_str(trimmed);
            result.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

/// 逻辑行：去掉续行、注释、recipe 行和 define 块
fn logical_lines(content: &str) -> Vec<String> {
    let lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
    let mut in_define = false;
    let mut out = Vec::new();

    for line in unfold_multiline(&lines) {
        if line.starts_with('\t') {
            continue;
        }
        let line = strip_comment(&line).trim().to_string();
        if line.is_empty() {
            continue;
        }
        if in_define {
            if line == "endef" {
                in_define = false;
            }
            continue;
        }
        if line == "define" || line.starts_with("define ") {
            in_define = true;
            continue;
        }
        out.push(line);
    }
    out
}

fn strip_comment(line: &str) -> &str {
    let mut prev = '\0';
    for (i, c) in line.char_indices() {
        if c == '#' && prev != '\\' {
            return &line[..i];
        }
        prev = c;
    }
    line
}

/// 解析变量赋值
///
/// `:=` / `::=` are expanded against the table at the point of assignment,
/// everything else is kept verbatim and expanded lazily by [`expand`].
pub fn parse_variables(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for line in logical_lines(content) {
        let Some(cap) = RE_ASSIGN.captures(&line) else {
            continue;
        };
        let key = cap[1].to_string();
        let val = cap[3].trim().to_string();

        match &cap[2] {
            "?=" => {
                vars.entry(key).or_insert(val);
            }
            "+=" => {
                let entry = vars.entry(key).or_default();
                if !entry.is_empty() && !val.is_empty() {
                    entry.push(' ');
                }
                entry.push_str(&val);
            }
            ":=" | "::=" => {
                let val = expand(&val, &vars);
                vars.insert(key, val);
            }
            _ => {
                vars.insert(key, val);
            }
        }
    }

    vars
}

/// Position of the rule separator, ignoring colons inside `$(...)` / `${...}`.
fn rule_colon(line: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in line.char_indices() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Whitespace split that keeps `$(addprefix a, b)` in one piece.
fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `.PHONY`, `.c.o` and friends; relative paths like `./app` are real targets.
fn is_special(word: &str) -> bool {
    (word.starts_with('.') && !word.starts_with("./") && !word.starts_with("../"))
        || word.contains('%')
}

fn basename(word: &str) -> String {
    word.rsplit(['/', '\\']).next().unwrap_or(word).to_string()
}

/// 解析规则目标（未展开）
pub fn parse_targets(content: &str) -> Vec<Target> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for line in logical_lines(content) {
        if RE_ASSIGN.is_match(&line) {
            continue;
        }
        let Some(colon) = rule_colon(&line) else {
            continue;
        };
        for word in split_words(&line[..colon]) {
            if is_special(&word) || !seen.insert(word.clone()) {
                continue;
            }
            targets.push(Target {
                basename: basename(&word),
                fullname: word,
            });
        }
    }

    targets
}

/// 展开 `$(VAR)` / `${VAR}`，未定义的变量展开为空串
pub fn expand(text: &str, vars: &BTreeMap<String, String>) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_EXPAND_ROUNDS {
        if !RE_PLACEHOLDER.is_match(&current) {
            break;
        }
        current = RE_PLACEHOLDER
            .replace_all(&current, |cap: &regex::Captures| {
                let name = cap.get(1).or_else(|| cap.get(2)).map_or("", |m| m.as_str());
                vars.get(name).cloned().unwrap_or_default()
            })
            .into_owned();
    }
    current
}

/// 解析 Makefile
pub fn parse_makefile(content: &str) -> MakefileInfo {
    let variables = parse_variables(content);
    let targets = parse_targets(content)
        .into_iter()
        .map(|t| Target {
            fullname: expand(&t.fullname, &variables),
            basename: t.basename,
        })
        .collect();

    MakefileInfo { variables, targets }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
HDR_DIR = include
HEADER = $(addprefix -I,$(HDR_DIR))
CC = g++
OBJ_DIR = obj
BUILD_DIR = build
OBJ = a.o \\
      main.o

$(BUILD_DIR)/main.out: $(addprefix $(OBJ_DIR)/,$(OBJ))
\t$(CC) $(OBJ) -o $(BUILD_DIR)/main.out

$(OBJ_DIR)/a.o: src/a.cpp
\t$(CC) -c src/a.cpp -o $(OBJ_DIR)/a.o $(HEADER)

.PHONY: run clean

run: $(BUILD_DIR)/main.out
\t./$(BUILD_DIR)/main.out

clean:
\trm -f $(OBJ_DIR)/*.o
";

    #[test]
    fn unfolds_continuations() {
        let lines = vec!["A = 1 \\".to_string(), "  2".to_string(), "B = 3".to_string()];
        assert_eq!(unfold_multiline(&lines), vec!["A = 1    2", "B = 3"]);
    }

    #[test]
    fn reads_variables() {
        let vars = parse_variables(SAMPLE);
        assert_eq!(vars["CC"], "g++");
        assert_eq!(vars["HEADER"], "$(addprefix -I,$(HDR_DIR))");
        assert_eq!(split_words(&vars["OBJ"]), vec!["a.o", "main.o"]);
    }

    #[test]
    fn assignment_flavours() {
        let vars = parse_variables(
            "CFLAGS = -g\nCFLAGS += -Wall\nCC ?= clang\nCC ?= gcc\nOPT := $(CFLAGS) -O2\nCFLAGS = -O0 # comment\n",
        );
        assert_eq!(vars["CC"], "clang");
        assert_eq!(vars["OPT"], "-g -Wall -O2");
        assert_eq!(vars["CFLAGS"], "-O0");
    }

    #[test]
    fn targets_are_expanded_and_named() {
        let info = parse_makefile(SAMPLE);
        let names: Vec<_> = info.targets.iter().map(|t| t.basename.as_str()).collect();
        assert_eq!(names, vec!["main.out", "a.o", "run", "clean"]);
        assert_eq!(info.targets[0].fullname, "build/main.out");
        assert_eq!(info.targets[1].fullname, "obj/a.o");
        assert_eq!(info.find("a.o").map(|t| t.fullname.as_str()), Some("obj/a.o"));
    }

    #[test]
    fn first_line_and_multiple_targets() {
        let targets = parse_targets("all debug: main.o\n\tcc main.o\nall: extra\n%.o: %.c\n\tcc -c $<\n");
        let names: Vec<_> = targets.iter().map(|t| t.fullname.as_str()).collect();
        assert_eq!(names, vec!["all", "debug"]);
    }

    #[test]
    fn assignments_and_recipes_are_not_targets() {
        let targets = parse_targets("X := a:b\nY ::= c\nall:\n\techo a: b\n");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].fullname, "all");
    }

    #[test]
    fn define_blocks_are_skipped() {
        let targets = parse_targets("define RULE\nfoo: bar\nendef\nreal: dep\n");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].basename, "real");
    }

    #[test]
    fn relative_targets_are_kept() {
        let targets = parse_targets("./app: main.o\n.SUFFIXES:\n.c.o:\n");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].basename, "app");
    }

    #[test]
    fn expansion_is_nested_and_tolerant() {
        let mut vars = BTreeMap::new();
        vars.insert("A".to_string(), "$(B)/x".to_string());
        vars.insert("B".to_string(), "${C}".to_string());
        vars.insert("C".to_string(), "root".to_string());
        vars.insert("LOOP".to_string(), "$(LOOP)".to_string());
        assert_eq!(expand("$(A)", &vars), "root/x");
        assert_eq!(expand("$(MISSING)/y", &vars), "/y");
        assert_eq!(expand("$(addprefix -I,$(C))", &vars), "$(addprefix -I,root)");
        assert_eq!(expand("$(LOOP)", &vars), "$(LOOP)");
    }

    #[test]
    fn windows_style_basename() {
        let targets = parse_targets("$(BUILD_DIR)\\main.exe: a.o\n");
        assert_eq!(targets[0].basename, "main.exe");
    }
}
