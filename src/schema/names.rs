//! Derived name forms and string distance helpers used by the resolver

/// Split a column or member name into lowercase word tokens.
///
/// Breaks on non-alphanumeric characters, lower-to-upper transitions,
/// the end of an acronym ("HTTPServer" -> "http", "server") and
/// letter/digit boundaries.
pub fn tokens(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut tokens);
            continue;
        }

        // a non-empty token means chars[i - 1] was alphanumeric
        if !current.is_empty() {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase() && c.is_uppercase() && next.is_some_and(|n| n.is_lowercase()))
                || (prev.is_alphabetic() && c.is_numeric())
                || (prev.is_numeric() && c.is_alphabetic());
            if boundary {
                flush(&mut current, &mut tokens);
            }
        }

        current.extend(c.to_lowercase());
    }

    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// Lowercase alphanumeric form: "Full_Name" -> "fullname"
pub fn alnum_lower(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// The normalized forms compared by the normalized-form pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameForms {
    pub alnum: String,
    pub snake: String,
    pub camel: String,
    pub tokens: Vec<String>,
}

impl NameForms {
    pub fn of(name: &str) -> Self {
        let tokens = tokens(name);
        let snake = tokens.join("_");
        let camel = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| if i == 0 { t.clone() } else { capitalize(t) })
            .collect();

        NameForms {
            alnum: alnum_lower(name),
            snake,
            camel,
            tokens,
        }
    }

    fn all(&self) -> [&str; 3] {
        [&self.alnum, &self.snake, &self.camel]
    }

    /// True when any derived form of `self` equals any derived form of `other`
    pub fn matches(&self, other: &NameForms) -> bool {
        self.all()
            .iter()
            .filter(|f| !f.is_empty())
            .any(|f| other.all().contains(f))
    }
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Levenshtein edit distance over Unicode scalar values
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = b.len();
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
