use crossterm::style::{Attribute, Color};
use termimad::{MadSkin, StyledChar};

// Leki palette
pub const HUNTER_GREEN: Color = Color::Rgb { r: 53, g: 94, b: 59 }; // #355E3B
pub const LIGHT_HUNTER: Color = Color::Rgb { r: 75, g: 123, b: 85 }; // #4B7B55
pub const MINT: Color = Color::Rgb { r: 216, g: 230, b: 219 }; // #D8E6DB
pub const DARK_MOSS: Color = Color::Rgb { r: 44, g: 77, b: 51 }; // #2C4D33

/// RGB of the hunter green for `colored::Colorize::truecolor`.
pub const RULE_RGB: (u8, u8, u8) = (53, 94, 59);

pub fn create_skin() -> MadSkin {
    let mut skin = MadSkin::default();

    skin.bold.set_fg(LIGHT_HUNTER);
    skin.headers[0].set_fg(LIGHT_HUNTER);
    skin.headers[0].add_attr(Attribute::Bold);
    skin.headers[1].set_fg(LIGHT_HUNTER);

    skin.code_block.set_fg(MINT);
    skin.code_block.set_bg(DARK_MOSS);

    skin.inline_code.set_fg(MINT);
    skin.inline_code.set_bg(HUNTER_GREEN);

    skin.quote_mark = StyledChar::from_fg_char(LIGHT_HUNTER, '▌');
    skin.bullet = StyledChar::from_fg_char(LIGHT_HUNTER, '•');

    skin
}
