/// A query as a tree of fragments, rendered into driver syntax at
/// preparation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryTemplate {
    /// A literal SQL fragment, emitted verbatim.
    Lit(String),
    /// A string value, emitted as a quoted literal in driver syntax.
    Quote(String),
    /// A reference to the parameter at the given 0-based index.
    Param(usize),
    /// A reference to an environment entry, resolved before rendering.
    Env(String),
    /// A sequence of fragments.
    Seq(Vec<QueryTemplate>),
}

impl QueryTemplate {
    pub fn lit(s: impl Into<String>) -> Self {
        QueryTemplate::Lit(s.into())
    }

    pub fn quote(s: impl Into<String>) -> Self {
        QueryTemplate::Quote(s.into())
    }

    pub fn env(name: impl Into<String>) -> Self {
        QueryTemplate::Env(name.into())
    }

    /// Builds a template from SQL text in which each `?` outside of quoted
    /// literals becomes the next positional parameter reference.
    #[must_use]
    pub fn with_question_marks(sql: &str) -> Self {
        let mut out = Vec::new();
        let mut lit = String::new();
        let mut param_idx = 0;
        let mut in_squote = false;
        let mut in_dquote = false;
        for c in sql.chars() {
            match c {
                '\'' if !in_dquote => {
                    in_squote = !in_squote;
                    lit.push(c);
                }
                '"' if !in_squote => {
                    in_dquote = !in_dquote;
                    lit.push(c);
                }
                '?' if !in_squote && !in_dquote => {
                    if !lit.is_empty() {
                        out.push(QueryTemplate::Lit(std::mem::take(&mut lit)));
                    }
                    out.push(QueryTemplate::Param(param_idx));
                    param_idx += 1;
                }
                _ => lit.push(c),
            }
        }
        if !lit.is_empty() {
            out.push(QueryTemplate::Lit(lit));
        }
        if out.len() == 1 {
            out.swap_remove(0)
        } else {
            QueryTemplate::Seq(out)
        }
    }

    /// Resolves `Env` nodes through `env`. With `finalize`, an unresolved
    /// environment reference is an error; otherwise it is left in place.
    pub fn expand<F>(&self, env: &F, finalize: bool) -> Result<QueryTemplate, String>
    where
        F: Fn(&str) -> Option<QueryTemplate>,
    {
        match self {
            QueryTemplate::Lit(_) | QueryTemplate::Quote(_) | QueryTemplate::Param(_) => {
                Ok(self.clone())
            }
            QueryTemplate::Env(name) => match env(name) {
                // resolved fragments may themselves contain Env nodes
                Some(t) => t.expand(env, finalize),
                None if finalize => Err(format!("unresolved environment reference \"{name}\"")),
                None => Ok(self.clone()),
            },
            QueryTemplate::Seq(parts) => {
                let mut out = Vec::with_capacity(parts.len());
                for part in parts {
                    out.push(part.expand(env, finalize)?);
                }
                Ok(QueryTemplate::Seq(out))
            }
        }
    }
}
