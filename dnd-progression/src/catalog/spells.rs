//! Built-in SRD spell list.
//!
//! Only what the engine needs is recorded: level, school, concentration,
//! ritual and the class lists a spell appears on.

use super::{SpellDefinition, SpellSchool};
use SpellSchool::*;

fn spell(
    slug: &str,
    name: &str,
    level: u8,
    school: SpellSchool,
    concentration: bool,
    classes: &[&str],
) -> SpellDefinition {
    SpellDefinition {
        slug: slug.to_string(),
        name: name.to_string(),
        level,
        school,
        concentration,
        ritual: false,
        classes: classes.iter().map(|c| c.to_string()).collect(),
    }
}

fn ritual(mut spell: SpellDefinition) -> SpellDefinition {
    spell.ritual = true;
    spell
}

pub(super) fn spells() -> Vec<SpellDefinition> {
    vec![
        // ====================================================================
        // CANTRIPS (Level 0)
        // ====================================================================
        spell("fire-bolt", "Fire Bolt", 0, Evocation, false, &["sorcerer", "wizard"]),
        spell("ray-of-frost", "Ray of Frost", 0, Evocation, false, &["sorcerer", "wizard"]),
        spell("mage-hand", "Mage Hand", 0, Conjuration, false, &["bard", "sorcerer", "warlock", "wizard"]),
        spell("light", "Light", 0, Evocation, false, &["bard", "cleric", "sorcerer", "wizard"]),
        spell("minor-illusion", "Minor Illusion", 0, Illusion, false, &["bard", "sorcerer", "warlock", "wizard"]),
        spell("prestidigitation", "Prestidigitation", 0, Transmutation, false, &["bard", "sorcerer", "warlock", "wizard"]),
        spell("sacred-flame", "Sacred Flame", 0, Evocation, false, &["cleric"]),
        spell("spare-the-dying", "Spare the Dying", 0, Necromancy, false, &["cleric"]),
        spell("guidance", "Guidance", 0, Divination, true, &["cleric", "druid"]),
        spell("druidcraft", "Druidcraft", 0, Transmutation, false, &["druid"]),
        spell("produce-flame", "Produce Flame", 0, Conjuration, false, &["druid"]),
        spell("shillelagh", "Shillelagh", 0, Transmutation, false, &["druid"]),
        spell("eldritch-blast", "Eldritch Blast", 0, Evocation, false, &["warlock"]),
        spell("vicious-mockery", "Vicious Mockery", 0, Enchantment, false, &["bard"]),
        // ====================================================================
        // 1st LEVEL
        // ====================================================================
        spell("magic-missile", "Magic Missile", 1, Evocation, false, &["sorcerer", "wizard"]),
        spell("shield", "Shield", 1, Abjuration, false, &["sorcerer", "wizard"]),
        spell("burning-hands", "Burning Hands", 1, Evocation, false, &["sorcerer", "wizard"]),
        spell("sleep", "Sleep", 1, Enchantment, false, &["bard", "sorcerer", "wizard"]),
        ritual(spell(
            "detect-magic",
            "Detect Magic",
            1,
            Divination,
            true,
            &["bard", "cleric", "druid", "paladin", "ranger", "sorcerer", "wizard"],
        )),
        spell("cure-wounds", "Cure Wounds", 1, Evocation, false, &["bard", "cleric", "druid", "paladin", "ranger"]),
        spell("healing-word", "Healing Word", 1, Evocation, false, &["bard", "cleric", "druid"]),
        spell("bless", "Bless", 1, Enchantment, true, &["cleric", "paladin"]),
        spell("guiding-bolt", "Guiding Bolt", 1, Evocation, false, &["cleric"]),
        spell("shield-of-faith", "Shield of Faith", 1, Abjuration, true, &["cleric", "paladin"]),
        spell("hex", "Hex", 1, Enchantment, true, &["warlock"]),
        spell("hunters-mark", "Hunter's Mark", 1, Divination, true, &["ranger"]),
        spell("entangle", "Entangle", 1, Conjuration, true, &["druid"]),
        spell("faerie-fire", "Faerie Fire", 1, Evocation, true, &["bard", "druid"]),
        spell("thunderwave", "Thunderwave", 1, Evocation, false, &["bard", "druid", "sorcerer", "wizard"]),
        spell("charm-person", "Charm Person", 1, Enchantment, false, &["bard", "druid", "sorcerer", "warlock", "wizard"]),
        spell("goodberry", "Goodberry", 1, Transmutation, false, &["druid", "ranger"]),
        ritual(spell("find-familiar", "Find Familiar", 1, Conjuration, false, &["wizard"])),
        // ====================================================================
        // 2nd LEVEL
        // ====================================================================
        spell("misty-step", "Misty Step", 2, Conjuration, false, &["sorcerer", "warlock", "wizard"]),
        spell("hold-person", "Hold Person", 2, Enchantment, true, &["bard", "cleric", "druid", "sorcerer", "warlock", "wizard"]),
        spell("spider-climb", "Spider Climb", 2, Transmutation, true, &["sorcerer", "warlock", "wizard"]),
        spell("lesser-restoration", "Lesser Restoration", 2, Abjuration, false, &["bard", "cleric", "druid", "paladin", "ranger"]),
        spell("spiritual-weapon", "Spiritual Weapon", 2, Evocation, false, &["cleric"]),
        spell("invisibility", "Invisibility", 2, Illusion, true, &["bard", "sorcerer", "warlock", "wizard"]),
        spell("barkskin", "Barkskin", 2, Transmutation, true, &["druid", "ranger"]),
        spell("pass-without-trace", "Pass without Trace", 2, Abjuration, true, &["druid", "ranger"]),
        spell("spike-growth", "Spike Growth", 2, Transmutation, true, &["druid", "ranger"]),
        spell("scorching-ray", "Scorching Ray", 2, Evocation, false, &["sorcerer", "wizard"]),
        spell("moonbeam", "Moonbeam", 2, Evocation, true, &["druid"]),
        spell("darkness", "Darkness", 2, Evocation, true, &["sorcerer", "warlock", "wizard"]),
        // ====================================================================
        // 3rd LEVEL
        // ====================================================================
        spell("fireball", "Fireball", 3, Evocation, false, &["sorcerer", "wizard"]),
        spell("lightning-bolt", "Lightning Bolt", 3, Evocation, false, &["sorcerer", "wizard"]),
        spell("counterspell", "Counterspell", 3, Abjuration, false, &["sorcerer", "warlock", "wizard"]),
        spell("revivify", "Revivify", 3, Necromancy, false, &["cleric", "paladin"]),
        spell("beacon-of-hope", "Beacon of Hope", 3, Abjuration, true, &["cleric"]),
        spell("call-lightning", "Call Lightning", 3, Conjuration, true, &["druid"]),
        spell("sleet-storm", "Sleet Storm", 3, Conjuration, true, &["druid", "sorcerer", "wizard"]),
        spell("slow", "Slow", 3, Transmutation, true, &["sorcerer", "wizard"]),
        spell("haste", "Haste", 3, Transmutation, true, &["sorcerer", "wizard"]),
        spell("plant-growth", "Plant Growth", 3, Transmutation, false, &["bard", "druid", "ranger"]),
        ritual(spell("meld-into-stone", "Meld into Stone", 3, Transmutation, false, &["cleric", "druid"])),
        // ====================================================================
        // 4th LEVEL
        // ====================================================================
        spell("death-ward", "Death Ward", 4, Abjuration, false, &["cleric", "paladin"]),
        spell("guardian-of-faith", "Guardian of Faith", 4, Conjuration, false, &["cleric"]),
        spell("freedom-of-movement", "Freedom of Movement", 4, Abjuration, false, &["bard", "cleric", "druid", "ranger"]),
        spell("ice-storm", "Ice Storm", 4, Evocation, false, &["druid", "sorcerer", "wizard"]),
        spell("stone-shape", "Stone Shape", 4, Transmutation, false, &["cleric", "druid", "wizard"]),
        spell("stoneskin", "Stoneskin", 4, Abjuration, true, &["druid", "ranger", "sorcerer", "wizard"]),
        spell("divination", "Divination", 4, Divination, false, &["cleric"]),
        spell("polymorph", "Polymorph", 4, Transmutation, true, &["bard", "druid", "sorcerer", "wizard"]),
        spell("banishment", "Banishment", 4, Abjuration, true, &["cleric", "paladin", "sorcerer", "warlock", "wizard"]),
        // ====================================================================
        // 5th LEVEL
        // ====================================================================
        spell("mass-cure-wounds", "Mass Cure Wounds", 5, Evocation, false, &["bard", "cleric", "druid"]),
        spell("raise-dead", "Raise Dead", 5, Necromancy, false, &["bard", "cleric", "paladin"]),
        spell("cone-of-cold", "Cone of Cold", 5, Evocation, false, &["sorcerer", "wizard"]),
        ritual(spell("commune-with-nature", "Commune with Nature", 5, Divination, false, &["druid", "ranger"])),
        spell("tree-stride", "Tree Stride", 5, Conjuration, true, &["druid", "ranger"]),
        spell("wall-of-stone", "Wall of Stone", 5, Evocation, true, &["druid", "sorcerer", "wizard"]),
        spell("passwall", "Passwall", 5, Transmutation, false, &["wizard"]),
        // ====================================================================
        // 6th LEVEL AND ABOVE
        // ====================================================================
        spell("chain-lightning", "Chain Lightning", 6, Evocation, false, &["sorcerer", "wizard"]),
        spell("heal", "Heal", 6, Evocation, false, &["cleric", "druid"]),
        spell("teleport", "Teleport", 7, Conjuration, false, &["bard", "sorcerer", "wizard"]),
        spell("sunburst", "Sunburst", 8, Evocation, false, &["druid", "sorcerer", "wizard"]),
        spell("wish", "Wish", 9, Conjuration, false, &["sorcerer", "wizard"]),
    ]
}
