use handlebars::Handlebars;
use serde::Serialize;

use crate::error::AppResult;

/// Page templates compiled once at start-up
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, handlebars::TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        registry.register_partial("layout", include_str!("../templates/layout.hbs"))?;
        registry.register_partial("messages", include_str!("../templates/messages.hbs"))?;

        registry.register_template_string("index", include_str!("../templates/index.hbs"))?;
        registry.register_template_string("login", include_str!("../templates/login.hbs"))?;
        registry.register_template_string("signup", include_str!("../templates/signup.hbs"))?;

        Ok(Self { registry })
    }

    /// Render a registered page with `data`
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> AppResult<String> {
        Ok(self.registry.render(name, data)?)
    }
}
