use crate::models::{CampaignContext, EmailMessage};

const COPY_INSTRUCTIONS: &str = r#"
You are an expert content strategist and marketing professional. Write a captivating blog post
that highlights the unique features and benefits of the featured product in persuasive, professional
language. Include an engaging headline, clear sections and a strong call-to-action. Reply with the
blog post text only, following this outline:

[shop name] - [tagline]
About Us: [shop description], Location: [address], Contact: [phone] / [email]
Featured Product: [product name]
Product Details: [description], Price: $[price], Available Quantity: [quantity]
Why Shop With Us?
Visit Us Today
"#;

const STRATEGY_INSTRUCTIONS: &str = r#"
Generate a comprehensive, professional marketing strategy for the shop and product below: target
audience analysis, social media campaign ideas, email marketing plans, promotional poster design
suggestions and a recommended campaign duration. Reply with valid JSON only, in exactly this shape:

{
  "target_audience": "two descriptive words for the target audience",
  "poster_design": "poster design ideas, about 20 words",
  "gender": "male | female | both",
  "age": "ideal age range, e.g. 18-35",
  "social_media": "TikTok, Instagram, YouTube and Facebook ideas, about 20 words",
  "email_marketing": "email marketing strategy, about 20 words",
  "campaign_duration": "recommended duration, e.g. 3 months"
}
"#;

pub fn copy_prompt(context: &CampaignContext) -> String {
    format!(
        "{}\nContext:\n{}",
        COPY_INSTRUCTIONS.trim(),
        context.describe()
    )
}

pub fn strategy_prompt(context: &CampaignContext) -> String {
    format!(
        "{}\nContext:\n{}",
        STRATEGY_INSTRUCTIONS.trim(),
        context.describe()
    )
}

pub fn poster_prompt(context: &CampaignContext) -> String {
    let product = &context.product;
    let shop = &context.shop;
    format!(
        "As an expert illustrator, design a professional e-commerce promotional poster for social media. \
         Keep text minimal and spell every word exactly as given.\n\
         - Product Name: {}\n- Shop Name: {}\n- Contact Number: {}\n- Contact Email: {}",
        product.product_name, shop.shop_name, shop.contact_number, shop.contact_email,
    )
}

/// Launch announcement sent to every recipient of a campaign.
pub fn announcement(context: &CampaignContext) -> EmailMessage {
    let product = &context.product;
    let shop = &context.shop;
    let subject = format!("Introducing Our Latest Product: {}", product.product_name);
    let body = format!(
        "We are delighted to announce the launch of our new product, '{product}', \
         available now at '{shop}'.\n\n\
         Product Overview:\n{description}\n\n\
         Price: ${price:.2}\n\n\
         We invite you to explore this exclusive offering and experience the quality and innovation \
         that define our brand.\n\n\
         Best regards,\nThe {shop} Team",
        product = product.product_name,
        shop = shop.shop_name,
        description = product.description,
        price = product.price,
    );
    EmailMessage { subject, body }
}

pub fn personalize(display_name: &str, body: &str) -> String {
    let name = display_name.trim();
    let name = if name.is_empty() {
        "Valued Customer"
    } else {
        name
    };
    format!("Dear {name},\n\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Product, Shop};

    fn context() -> CampaignContext {
        CampaignContext::new(
            Product {
                id: "p1".into(),
                shop_id: "s1".into(),
                product_name: "Linen Kurta".into(),
                description: "Breathable summer wear".into(),
                price: 24.5,
                quantity: 10,
            },
            Shop {
                id: "s1".into(),
                shop_name: "Threadline".into(),
                tagline: "Made to last".into(),
                description: "Family tailoring shop".into(),
                address: "12 Mall Road".into(),
                contact_number: "+1 555 0100".into(),
                contact_email: "hello@threadline.test".into(),
            },
        )
    }

    #[test]
    fn announcement_names_product_and_shop() {
        let message = announcement(&context());
        assert_eq!(message.subject, "Introducing Our Latest Product: Linen Kurta");
        assert!(message.body.contains("'Linen Kurta', available now at 'Threadline'"));
        assert!(message.body.contains("Price: $24.50"));
        assert!(message.body.ends_with("The Threadline Team"));
    }

    #[test]
    fn personalize_prefixes_greeting() {
        assert_eq!(personalize("Ana", "Hi there"), "Dear Ana,\n\nHi there");
        assert_eq!(personalize("  ", "x"), "Dear Valued Customer,\n\nx");
    }

    #[test]
    fn prompts_carry_context() {
        let ctx = context();
        assert!(copy_prompt(&ctx).contains("Linen Kurta"));
        assert!(strategy_prompt(&ctx).contains("\"campaign_duration\""));
        let poster = poster_prompt(&ctx);
        assert!(poster.contains("Shop Name: Threadline"));
        assert!(poster.contains("hello@threadline.test"));
    }
}
