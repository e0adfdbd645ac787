//! 单例任务识别：同一时间只允许运行一个的操作（构建、lint、测试等）

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 单例操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingletonKind {
    Build,
    Lint,
    Test,
    Typecheck,
    Install,
    Deploy,
}

impl SingletonKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SingletonKind::Build => "build",
            SingletonKind::Lint => "lint",
            SingletonKind::Test => "test",
            SingletonKind::Typecheck => "typecheck",
            SingletonKind::Install => "install",
            SingletonKind::Deploy => "deploy",
        }
    }
}

impl std::fmt::Display for SingletonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Heuristic {
    kind: SingletonKind,
    needles: &'static [&'static str],
    pattern: Option<Regex>,
}

// 按优先级排列：先命中者胜出
lazy_static! {
    static ref HEURISTICS: Vec<Heuristic> = vec![
        Heuristic {
            kind: SingletonKind::Build,
            needles: &["npm run build", "yarn build", "pnpm build", "bun build", "cargo build"],
            pattern: Some(Regex::new(r"\bbuild\b.*project").unwrap()),
        },
        Heuristic {
            kind: SingletonKind::Lint,
            needles: &["npm run lint", "yarn lint", "eslint", "cargo clippy"],
            pattern: Some(Regex::new(r"\blint\b.*code").unwrap()),
        },
        Heuristic {
            kind: SingletonKind::Test,
            needles: &["npm test", "yarn test", "jest", "vitest", "cargo test"],
            pattern: Some(Regex::new(r"\btest\b.*suite").unwrap()),
        },
        Heuristic {
            kind: SingletonKind::Typecheck,
            needles: &["typecheck", "tsc --noemit"],
            pattern: None,
        },
        Heuristic {
            kind: SingletonKind::Install,
            needles: &["npm install", "yarn install", "pnpm install"],
            pattern: Some(Regex::new(r"\binstall\b.*dependencies").unwrap()),
        },
        Heuristic {
            kind: SingletonKind::Deploy,
            needles: &["deploy"],
            pattern: None,
        },
    ];
}

/// 从任务描述文本中识别单例操作，未命中返回 `None`
pub fn detect_singleton(text: &str) -> Option<SingletonKind> {
    let lower = text.to_lowercase();
    HEURISTICS
        .iter()
        .find(|h| {
            h.needles.iter().any(|n| lower.contains(n))
                || h.pattern.as_ref().is_some_and(|re| re.is_match(&lower))
        })
        .map(|h| h.kind)
}
