//! Email subjects and bodies keyed by notification type.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown email type: {0}")]
    UnknownType(String),
    #[error("template data must be a JSON object")]
    DataNotObject,
}

struct Template {
    kind: &'static str,
    subject: &'static str,
    body: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        kind: "welcome",
        subject: "Welcome to RecipeHub!",
        body: "Hello {{.user_name}},

Welcome to RecipeHub! We're excited to have you join our community of food lovers.

Start exploring recipes, share your own creations, and connect with fellow cooks.

Happy cooking!
The RecipeHub Team",
    },
    Template {
        kind: "recipe_liked",
        subject: "Someone liked your recipe!",
        body: "Hello,

{{.liked_by_name}} (@{{.liked_by_username}}) just liked your recipe \"{{.recipe_title}}\".

View your recipe: https://recipehub.com/recipes/{{.recipe_id}}

The RecipeHub Team",
    },
    Template {
        kind: "recipe_commented",
        subject: "New comment on your recipe",
        body: "Hello,

{{.commented_by_name}} (@{{.commented_by_username}}) left a comment on your recipe \"{{.recipe_title}}\":

\"{{.comment}}\"

View the conversation: https://recipehub.com/recipes/{{.recipe_id}}

The RecipeHub Team",
    },
    Template {
        kind: "recipe_rated",
        subject: "Your recipe received a new rating!",
        body: "Hello,

{{.rated_by_name}} (@{{.rated_by_username}}) gave your recipe \"{{.recipe_title}}\" a {{.rating}}-star rating!

View your recipe: https://recipehub.com/recipes/{{.recipe_id}}

The RecipeHub Team",
    },
    Template {
        kind: "recipe_purchased",
        subject: "Your recipe was purchased!",
        body: "Hello,

{{.purchased_by_name}} (@{{.purchased_by_username}}) just purchased your premium recipe \"{{.recipe_title}}\" for {{.amount}}.

View your recipe: https://recipehub.com/recipes/{{.recipe_id}}

The RecipeHub Team",
    },
    Template {
        kind: "purchase_confirmation",
        subject: "Purchase Confirmation - RecipeHub",
        body: "Hello,

Thank you for your purchase! You now have access to the premium recipe \"{{.recipe_title}}\" by {{.seller_name}}.

Amount paid: {{.amount}}

View your recipe: https://recipehub.com/recipes/{{.recipe_id}}

The RecipeHub Team",
    },
];

/// Renders `(subject, body)`. Placeholders with no matching field render empty.
pub fn render(kind: &str, data: &Value) -> Result<(String, String), TemplateError> {
    lazy_static! {
        static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").unwrap();
    }

    let template = TEMPLATES
        .iter()
        .find(|t| t.kind == kind)
        .ok_or_else(|| TemplateError::UnknownType(kind.to_string()))?;
    let empty = serde_json::Map::new();
    let fields = match data {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err(TemplateError::DataNotObject),
    };

    let body = PLACEHOLDER.replace_all(template.body, |caps: &Captures<'_>| {
        match fields.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    });
    Ok((template.subject.to_string(), body.into_owned()))
}
