//! Built-in SRD classes, subclasses, feats and the 5e rule system.

use super::{
    AbilityMinimum, AbilityRequirement, CircleSpells, ClassDefinition, FeatBenefit,
    FeatDefinition, FeatureDefinition, Prerequisite, ResourceTemplate, RuleSystem,
};
use crate::tables::STANDARD_SLOT_ROWS;
use crate::world::{Ability, RechargePolicy};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Builders
// ============================================================================

fn class(
    slug: &str,
    name: &str,
    hit_die: u8,
    spellcasting_ability: Option<Ability>,
    saving_throws: [Ability; 2],
    armor: &[&str],
    subclass_level: u8,
) -> ClassDefinition {
    ClassDefinition {
        slug: slug.to_string(),
        name: name.to_string(),
        hit_die,
        spellcasting_ability,
        is_spellcaster: spellcasting_ability.is_some(),
        parent_slug: None,
        subclass_level: Some(subclass_level),
        level_features: BTreeMap::new(),
        spell_slots: BTreeMap::new(),
        cantrips_known: Vec::new(),
        spells_known: Vec::new(),
        spell_list: None,
        circle_spells: None,
        bonus_cantrip: false,
        saving_throws: saving_throws.to_vec(),
        armor_proficiencies: armor.iter().map(|a| a.to_string()).collect(),
    }
}

fn subclass(slug: &str, name: &str, parent: &str) -> ClassDefinition {
    ClassDefinition {
        slug: slug.to_string(),
        name: name.to_string(),
        hit_die: 0,
        spellcasting_ability: None,
        is_spellcaster: false,
        parent_slug: Some(parent.to_string()),
        subclass_level: None,
        level_features: BTreeMap::new(),
        spell_slots: BTreeMap::new(),
        cantrips_known: Vec::new(),
        spells_known: Vec::new(),
        spell_list: None,
        circle_spells: None,
        bonus_cantrip: false,
        saving_throws: Vec::new(),
        armor_proficiencies: Vec::new(),
    }
}

fn feature(slug: &str, name: &str, description: &str) -> FeatureDefinition {
    FeatureDefinition::new(slug, name, description)
}

impl ClassDefinition {
    fn at(mut self, level: u8, feature: FeatureDefinition) -> Self {
        self.level_features.entry(level).or_default().push(feature);
        self
    }

    fn cantrips(mut self, table: Vec<u8>) -> Self {
        self.cantrips_known = table;
        self
    }

    fn known(mut self, table: Vec<u8>) -> Self {
        self.spells_known = table;
        self
    }

    /// Turn a martial subclass into a caster on another class's list.
    fn casting(mut self, ability: Ability, list: &str, divisor: u8, start: u8) -> Self {
        self.is_spellcaster = true;
        self.spellcasting_ability = Some(ability);
        self.spell_list = Some(list.to_string());
        self.spell_slots = partial_caster_slots(divisor, start);
        self
    }
}

/// Expand `(level, value)` breakpoints into a 20-entry per-level table.
fn by_level(breaks: &[(u8, u8)]) -> Vec<u8> {
    (1..=20u8)
        .map(|level| {
            breaks
                .iter()
                .filter(|(from, _)| *from <= level)
                .last()
                .map(|(_, value)| *value)
                .unwrap_or(0)
        })
        .collect()
}

fn explicit(values: [u8; 20]) -> Vec<u8> {
    values.to_vec()
}

/// Single-class slot table for half and third casters: the shared row at
/// `ceil(level / divisor)` from `start` onward.
fn partial_caster_slots(divisor: u8, start: u8) -> BTreeMap<u8, Vec<u8>> {
    (start..=20u8)
        .map(|level| {
            let row = STANDARD_SLOT_ROWS[(level.div_ceil(divisor) - 1) as usize];
            let slots: Vec<u8> = row.iter().copied().take_while(|&n| n > 0).collect();
            (level, slots)
        })
        .collect()
}

fn tiers(entries: &[(u8, &[&str])]) -> BTreeMap<u8, Vec<String>> {
    entries
        .iter()
        .map(|(level, spells)| (*level, spells.iter().map(|s| s.to_string()).collect()))
        .collect()
}

const RAGE_USES: &str =
    "2+floor((level+17)/20)+floor((level+14)/20)+floor((level+8)/20)+floor((level+3)/20)";
const CHANNEL_DIVINITY_USES: &str = "1+floor((level+14)/20)+floor((level+2)/20)";

// ============================================================================
// Classes
// ============================================================================

pub(super) fn classes() -> Vec<ClassDefinition> {
    use Ability::*;
    use RechargePolicy::*;

    let fighting_styles = [
        "archery",
        "defense",
        "dueling",
        "great-weapon-fighting",
        "protection",
        "two-weapon-fighting",
    ];

    vec![
        class("barbarian", "Barbarian", 12, None, [Strength, Constitution], &["light", "medium", "shields"], 3)
            .at(1, feature("rage", "Rage", "Enter a rage as a bonus action for advantage on STR checks and resistance to physical damage.")
                .with_resource("Rage", RAGE_USES, LongRest))
            .at(1, feature("unarmored-defense", "Unarmored Defense", "Without armor, AC equals 10 + DEX modifier + CON modifier."))
            .at(2, feature("reckless-attack", "Reckless Attack", "Attack with advantage; attacks against you have advantage until your next turn."))
            .at(2, feature("danger-sense", "Danger Sense", "Advantage on DEX saves against effects you can see."))
            .at(5, feature("extra-attack", "Extra Attack", "Attack twice when you take the Attack action."))
            .at(5, feature("fast-movement", "Fast Movement", "Speed increases by 10 feet while not wearing heavy armor."))
            .at(7, feature("feral-instinct", "Feral Instinct", "Advantage on initiative rolls."))
            .at(9, feature("brutal-critical", "Brutal Critical", "Roll one additional weapon damage die on a critical hit.")),
        subclass("path-of-the-berserker", "Path of the Berserker", "barbarian")
            .at(3, feature("frenzy", "Frenzy", "While raging, make a melee attack as a bonus action each turn."))
            .at(6, feature("mindless-rage", "Mindless Rage", "Cannot be charmed or frightened while raging.")),

        class("bard", "Bard", 8, Some(Charisma), [Dexterity, Charisma], &["light"], 3)
            .cantrips(by_level(&[(1, 2), (4, 3), (10, 4)]))
            .known(explicit([4, 5, 6, 7, 8, 9, 10, 11, 12, 14, 15, 15, 16, 18, 19, 19, 20, 22, 22, 22]))
            .at(1, feature("spellcasting-bard", "Spellcasting", "Cast bard spells using Charisma."))
            .at(1, feature("bardic-inspiration", "Bardic Inspiration", "Grant an inspiration die to a creature as a bonus action.")
                .with_resource("Bardic Inspiration", "proficiency_bonus", LongRest))
            .at(2, feature("jack-of-all-trades", "Jack of All Trades", "Add half proficiency to ability checks you are not proficient in."))
            .at(2, feature("song-of-rest", "Song of Rest", "Allies regain extra HP when spending Hit Dice during a short rest."))
            .at(3, feature("expertise-bard", "Expertise", "Double proficiency for two skills."))
            .at(5, feature("font-of-inspiration", "Font of Inspiration", "Bardic Inspiration recharges on a short rest.")),
        subclass("college-of-lore", "College of Lore", "bard")
            .at(3, feature("cutting-words", "Cutting Words", "Spend Bardic Inspiration to reduce an enemy's roll."))
            .at(6, feature("additional-magical-secrets", "Additional Magical Secrets", "Learn two spells from any class.")),

        class("cleric", "Cleric", 8, Some(Wisdom), [Wisdom, Charisma], &["light", "medium", "shields"], 1)
            .cantrips(by_level(&[(1, 3), (4, 4), (10, 5)]))
            .at(1, feature("spellcasting-cleric", "Spellcasting", "Prepare and cast cleric spells using Wisdom."))
            .at(2, feature("channel-divinity", "Channel Divinity", "Channel divine energy for Turn Undead or a domain effect.")
                .with_resource("Channel Divinity", CHANNEL_DIVINITY_USES, ShortRest))
            .at(5, feature("destroy-undead", "Destroy Undead", "Turn Undead destroys low-CR undead outright."))
            .at(10, feature("divine-intervention", "Divine Intervention", "Call on your deity to intervene.")),
        subclass("life-domain", "Life Domain", "cleric")
            .at(1, feature("disciple-of-life", "Disciple of Life", "Healing spells restore additional 2 + spell level HP."))
            .at(2, feature("preserve-life", "Channel Divinity: Preserve Life", "Restore HP equal to five times your cleric level, split among creatures."))
            .at(6, feature("blessed-healer", "Blessed Healer", "Healing others also heals you."))
            .with_circle(CircleSpells::Fixed {
                tiers: tiers(&[
                    (1, &["bless", "cure-wounds"]),
                    (3, &["lesser-restoration", "spiritual-weapon"]),
                    (5, &["beacon-of-hope", "revivify"]),
                    (7, &["death-ward", "guardian-of-faith"]),
                    (9, &["mass-cure-wounds", "raise-dead"]),
                ]),
            }),

        class("druid", "Druid", 8, Some(Wisdom), [Intelligence, Wisdom], &["light", "medium", "shields"], 2)
            .cantrips(by_level(&[(1, 2), (4, 3), (10, 4)]))
            .at(1, feature("druidic", "Druidic", "You know the secret language of druids."))
            .at(1, feature("spellcasting-druid", "Spellcasting", "Prepare and cast druid spells using Wisdom."))
            .at(2, feature("wild-shape", "Wild Shape", "Magically assume the shape of a beast.")
                .with_resource("Wild Shape", "2", ShortRest))
            .at(18, feature("timeless-body", "Timeless Body", "You age more slowly.")),
        subclass("circle-of-the-land", "Circle of the Land", "druid")
            .at(2, feature("bonus-cantrip", "Bonus Cantrip", "Learn one additional druid cantrip."))
            .at(2, feature("natural-recovery", "Natural Recovery", "Recover expended spell slots during a short rest.")
                .with_slot_recovery("ceil(level/2)", 5))
            .at(6, feature("lands-stride", "Land's Stride", "Nonmagical difficult terrain costs no extra movement."))
            .with_bonus_cantrip()
            .with_circle(CircleSpells::ByTerrain {
                terrains: BTreeMap::from([
                    (
                        "arctic".to_string(),
                        tiers(&[
                            (3, &["hold-person", "spike-growth"]),
                            (5, &["sleet-storm", "slow"]),
                            (7, &["freedom-of-movement", "ice-storm"]),
                            (9, &["commune-with-nature", "cone-of-cold"]),
                        ]),
                    ),
                    (
                        "forest".to_string(),
                        tiers(&[
                            (3, &["barkskin", "spider-climb"]),
                            (5, &["call-lightning", "plant-growth"]),
                            (7, &["divination", "freedom-of-movement"]),
                            (9, &["commune-with-nature", "tree-stride"]),
                        ]),
                    ),
                    (
                        "mountain".to_string(),
                        tiers(&[
                            (3, &["spider-climb", "spike-growth"]),
                            (5, &["lightning-bolt", "meld-into-stone"]),
                            (7, &["stone-shape", "stoneskin"]),
                            (9, &["passwall", "wall-of-stone"]),
                        ]),
                    ),
                ]),
            }),

        class("fighter", "Fighter", 10, None, [Strength, Constitution], &["light", "medium", "heavy", "shields"], 3)
            .at(1, feature("fighting-style-fighter", "Fighting Style", "Adopt a particular style of fighting.")
                .with_options(&fighting_styles))
            .at(1, feature("second-wind", "Second Wind", "Regain 1d10 + fighter level HP as a bonus action.")
                .with_resource("Second Wind", "1", ShortRest))
            .at(2, feature("action-surge", "Action Surge", "Take one additional action on your turn.")
                .with_resource("Action Surge", "1+floor(level/17)", ShortRest))
            .at(5, feature("extra-attack-fighter", "Extra Attack", "Attack twice when you take the Attack action."))
            .at(9, feature("indomitable", "Indomitable", "Reroll a failed saving throw.")
                .with_resource("Indomitable", "floor((level-5)/4)", LongRest))
            .at(11, feature("extra-attack-2", "Extra Attack (2)", "Attack three times when you take the Attack action.")),
        subclass("champion", "Champion", "fighter")
            .at(3, feature("improved-critical", "Improved Critical", "Weapon attacks score a critical hit on a 19 or 20."))
            .at(7, feature("remarkable-athlete", "Remarkable Athlete", "Add half proficiency to STR, DEX and CON checks.")),
        subclass("eldritch-knight", "Eldritch Knight", "fighter")
            .casting(Intelligence, "wizard", 3, 3)
            .cantrips(by_level(&[(3, 2), (10, 3)]))
            .known(explicit([0, 0, 3, 4, 4, 4, 5, 6, 6, 7, 8, 8, 9, 10, 10, 11, 11, 11, 12, 13]))
            .at(3, feature("spellcasting-eldritch-knight", "Spellcasting", "Cast wizard spells using Intelligence."))
            .at(3, feature("weapon-bond", "Weapon Bond", "Bond with up to two weapons that cannot be disarmed."))
            .at(7, feature("war-magic", "War Magic", "Cast a cantrip and make a weapon attack as a bonus action.")),

        class("monk", "Monk", 8, None, [Strength, Dexterity], &[], 3)
            .at(1, feature("martial-arts", "Martial Arts", "Use DEX for unarmed strikes and monk weapons."))
            .at(2, feature("ki", "Ki", "Spend ki points to fuel Flurry of Blows, Patient Defense and Step of the Wind.")
                .with_resource("Ki", "level", ShortRest))
            .at(2, feature("unarmored-movement", "Unarmored Movement", "Speed increases while not wearing armor."))
            .at(5, feature("stunning-strike", "Stunning Strike", "Spend 1 ki to attempt to stun a creature you hit."))
            .at(7, feature("evasion-monk", "Evasion", "Take no damage on a successful DEX save for half damage.")),
        subclass("way-of-the-open-hand", "Way of the Open Hand", "monk")
            .at(3, feature("open-hand-technique", "Open Hand Technique", "Flurry of Blows can knock prone, push, or deny reactions."))
            .at(6, feature("wholeness-of-body", "Wholeness of Body", "Regain HP equal to three times your monk level.")
                .with_resource("Wholeness of Body", "1", LongRest)),

        class("paladin", "Paladin", 10, Some(Charisma), [Wisdom, Charisma], &["light", "medium", "heavy", "shields"], 3)
            .with_slots(partial_caster_slots(2, 2))
            .at(1, feature("divine-sense", "Divine Sense", "Detect celestials, fiends and undead nearby."))
            .at(1, feature("lay-on-hands", "Lay on Hands", "Restore HP from a pool equal to five times your paladin level.")
                .with_resource("Lay on Hands", "level*5", LongRest))
            .at(2, feature("fighting-style-paladin", "Fighting Style", "Adopt a particular style of fighting.")
                .with_options(&["defense", "dueling", "great-weapon-fighting", "protection"]))
            .at(2, feature("spellcasting-paladin", "Spellcasting", "Prepare and cast paladin spells using Charisma."))
            .at(2, feature("divine-smite", "Divine Smite", "Expend a spell slot to deal extra radiant damage."))
            .at(5, feature("extra-attack-paladin", "Extra Attack", "Attack twice when you take the Attack action.")),
        subclass("oath-of-devotion", "Oath of Devotion", "paladin")
            .at(3, feature("sacred-weapon", "Channel Divinity: Sacred Weapon", "Add CHA modifier to attack rolls with a weapon."))
            .at(7, feature("aura-of-devotion", "Aura of Devotion", "You and nearby allies cannot be charmed.")),

        class("ranger", "Ranger", 10, Some(Wisdom), [Strength, Dexterity], &["light", "medium", "shields"], 3)
            .with_slots(partial_caster_slots(2, 2))
            .known(explicit([0, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11]))
            .at(1, feature("favored-enemy", "Favored Enemy", "Advantage on tracking and recalling lore about a chosen enemy type.")
                .with_options(&["aberrations", "beasts", "dragons", "fiends", "monstrosities", "undead"]))
            .at(1, feature("natural-explorer", "Natural Explorer", "Expertise in navigating a favored terrain."))
            .at(2, feature("fighting-style-ranger", "Fighting Style", "Adopt a particular style of fighting.")
                .with_options(&["archery", "defense", "dueling", "two-weapon-fighting"]))
            .at(2, feature("spellcasting-ranger", "Spellcasting", "Cast ranger spells using Wisdom."))
            .at(5, feature("extra-attack-ranger", "Extra Attack", "Attack twice when you take the Attack action.")),
        subclass("hunter", "Hunter", "ranger")
            .at(3, feature("hunters-prey", "Hunter's Prey", "Gain a hunting technique.")
                .with_options(&["colossus-slayer", "giant-killer", "horde-breaker"])),

        class("rogue", "Rogue", 8, None, [Dexterity, Intelligence], &["light"], 3)
            .at(1, feature("expertise-rogue", "Expertise", "Double proficiency for two skills."))
            .at(1, feature("sneak-attack", "Sneak Attack", "Deal extra damage once per turn with advantage or an adjacent ally."))
            .at(1, feature("thieves-cant", "Thieves' Cant", "Secret mix of dialect, jargon and code."))
            .at(2, feature("cunning-action", "Cunning Action", "Dash, Disengage or Hide as a bonus action."))
            .at(5, feature("uncanny-dodge", "Uncanny Dodge", "Halve the damage of an attack you can see."))
            .at(7, feature("evasion-rogue", "Evasion", "Take no damage on a successful DEX save for half damage."))
            .at(11, feature("reliable-talent", "Reliable Talent", "Treat d20 rolls of 9 or lower as 10 on proficient checks.")),
        subclass("thief", "Thief", "rogue")
            .at(3, feature("fast-hands", "Fast Hands", "Use Cunning Action for Sleight of Hand, thieves' tools, or Use an Object."))
            .at(3, feature("second-story-work", "Second-Story Work", "Climbing costs no extra movement.")),
        subclass("arcane-trickster", "Arcane Trickster", "rogue")
            .casting(Intelligence, "wizard", 3, 3)
            .cantrips(by_level(&[(3, 3), (10, 4)]))
            .known(explicit([0, 0, 3, 4, 4, 4, 5, 6, 6, 7, 8, 8, 9, 10, 10, 11, 11, 11, 12, 13]))
            .at(3, feature("spellcasting-arcane-trickster", "Spellcasting", "Cast wizard spells using Intelligence."))
            .at(3, feature("mage-hand-legerdemain", "Mage Hand Legerdemain", "Your mage hand is invisible and can pick pockets.")),

        class("sorcerer", "Sorcerer", 6, Some(Charisma), [Constitution, Charisma], &[], 1)
            .cantrips(by_level(&[(1, 4), (4, 5), (10, 6)]))
            .known(explicit([2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 12, 13, 13, 14, 14, 15, 15, 15, 15]))
            .at(1, feature("spellcasting-sorcerer", "Spellcasting", "Cast sorcerer spells using Charisma."))
            .at(2, feature("font-of-magic", "Font of Magic", "Convert between sorcery points and spell slots.")
                .with_resource("Sorcery Points", "level", LongRest))
            .at(3, feature("metamagic", "Metamagic", "Twist your spells to suit your needs.")),
        subclass("draconic-bloodline", "Draconic Bloodline", "sorcerer")
            .at(1, feature("dragon-ancestor", "Dragon Ancestor", "Choose a dragon type as your ancestor.")
                .with_options(&["black", "blue", "brass", "bronze", "copper", "gold", "green", "red", "silver", "white"]))
            .at(1, feature("draconic-resilience", "Draconic Resilience", "HP maximum increases by 1 per sorcerer level."))
            .at(6, feature("elemental-affinity", "Elemental Affinity", "Add CHA modifier to damage of your ancestry's type.")),

        class("warlock", "Warlock", 8, Some(Charisma), [Wisdom, Charisma], &["light"], 1)
            .cantrips(by_level(&[(1, 2), (4, 3), (10, 4)]))
            .known(explicit([2, 3, 4, 5, 6, 7, 8, 9, 10, 10, 11, 11, 12, 12, 13, 13, 14, 14, 15, 15]))
            .at(1, feature("pact-magic", "Pact Magic", "Cast warlock spells using Charisma; slots recover on a short rest."))
            .at(2, feature("eldritch-invocations", "Eldritch Invocations", "Learn fragments of forbidden knowledge."))
            .at(3, feature("pact-boon", "Pact Boon", "Receive a gift from your patron.")
                .with_options(&["pact-of-the-blade", "pact-of-the-chain", "pact-of-the-tome"]))
            .at(11, feature("mystic-arcanum", "Mystic Arcanum", "Cast one 6th-level spell once per long rest.")),
        subclass("the-fiend", "The Fiend", "warlock")
            .at(1, feature("dark-ones-blessing", "Dark One's Blessing", "Gain temporary HP when you reduce a hostile creature to 0 HP."))
            .at(6, feature("dark-ones-own-luck", "Dark One's Own Luck", "Add a d10 to an ability check or saving throw.")
                .with_resource("Dark One's Own Luck", "1", ShortRest)),

        class("wizard", "Wizard", 6, Some(Intelligence), [Intelligence, Wisdom], &[], 2)
            .cantrips(by_level(&[(1, 3), (4, 4), (10, 5)]))
            .at(1, feature("spellcasting-wizard", "Spellcasting", "Prepare and cast wizard spells from your spellbook using Intelligence."))
            .at(1, feature("arcane-recovery", "Arcane Recovery", "Recover expended spell slots during a short rest.")
                .with_slot_recovery("ceil(level/2)", 5))
            .at(18, feature("spell-mastery", "Spell Mastery", "Cast a 1st- and 2nd-level spell at will.")),
        subclass("school-of-evocation", "School of Evocation", "wizard")
            .at(2, feature("evocation-savant", "Evocation Savant", "Copying evocation spells costs half the gold and time."))
            .at(2, feature("sculpt-spells", "Sculpt Spells", "Protect allies from your evocation spells.")),
    ]
}

impl ClassDefinition {
    fn with_slots(mut self, slots: BTreeMap<u8, Vec<u8>>) -> Self {
        self.spell_slots = slots;
        self
    }

    fn with_circle(mut self, circle: CircleSpells) -> Self {
        self.circle_spells = Some(circle);
        self
    }

    fn with_bonus_cantrip(mut self) -> Self {
        self.bonus_cantrip = true;
        self
    }
}

// ============================================================================
// Feats
// ============================================================================

fn feat(slug: &str, name: &str, description: &str) -> FeatDefinition {
    FeatDefinition {
        slug: slug.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        prerequisites: Vec::new(),
        benefits: Vec::new(),
        repeatable: false,
    }
}

impl FeatDefinition {
    fn requires(mut self, prerequisite: Prerequisite) -> Self {
        self.prerequisites.push(prerequisite);
        self
    }

    fn grants(mut self, benefit: FeatBenefit) -> Self {
        self.benefits.push(benefit);
        self
    }

    fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }
}

pub(super) fn feats() -> Vec<FeatDefinition> {
    use Ability::*;

    vec![
        feat("alert", "Alert", "Always on the lookout for danger.")
            .grants(FeatBenefit::Initiative { bonus: 5 }),
        feat("tough", "Tough", "Your hit point maximum increases by 2 for every level.")
            .grants(FeatBenefit::HpPerLevel { bonus: 2 }),
        feat("mobile", "Mobile", "Exceptionally speedy and agile.")
            .grants(FeatBenefit::Speed { bonus: 10 }),
        feat("resilient", "Resilient", "Increase one ability by 1 and gain proficiency in its saving throws.")
            .grants(FeatBenefit::AbilityIncrease { options: Vec::new(), amount: 1 })
            .grants(FeatBenefit::SavingThrowProficiency)
            .repeatable(),
        feat("magic-initiate", "Magic Initiate", "Learn two cantrips and one 1st-level spell.")
            .grants(FeatBenefit::Cantrips { count: 2 })
            .grants(FeatBenefit::Spells { count: 1, max_level: 1 })
            .repeatable(),
        feat("skilled", "Skilled", "Gain proficiency in any combination of three skills or tools.")
            .grants(FeatBenefit::Skills { count: 3 })
            .repeatable(),
        feat("war-caster", "War Caster", "Advantage on concentration saves and cast spells as opportunity attacks.")
            .requires(Prerequisite::Spellcasting),
        feat("skill-expert", "Skill Expert", "Increase one ability by 1, gain a skill proficiency and expertise in one skill.")
            .grants(FeatBenefit::AbilityIncrease { options: Vec::new(), amount: 1 })
            .grants(FeatBenefit::Skills { count: 1 })
            .grants(FeatBenefit::Expertise { count: 1 }),
        feat("heavily-armored", "Heavily Armored", "Increase Strength by 1 and gain proficiency with heavy armor.")
            .requires(Prerequisite::Proficiency { proficiency: "medium".to_string() })
            .grants(FeatBenefit::AbilityIncrease { options: vec![Strength], amount: 1 })
            .grants(FeatBenefit::ArmorProficiency { armor: "heavy".to_string() }),
        feat("lucky", "Lucky", "Reroll attack rolls, ability checks or saving throws.")
            .grants(FeatBenefit::Resource {
                resource: ResourceTemplate {
                    name: "Luck Points".to_string(),
                    max: "3".to_string(),
                    recharge: RechargePolicy::LongRest,
                },
            }),
        feat("grappler", "Grappler", "Advantage on attacks against creatures you are grappling.")
            .requires(Prerequisite::Ability { ability: Strength, minimum: 13 }),
        feat("ritual-caster", "Ritual Caster", "Cast spells as rituals from a ritual book.")
            .requires(Prerequisite::AnyOf {
                options: vec![
                    Prerequisite::Ability { ability: Intelligence, minimum: 13 },
                    Prerequisite::Ability { ability: Wisdom, minimum: 13 },
                ],
            }),
        feat("linguist", "Linguist", "Increase Intelligence by 1 and learn three languages.")
            .grants(FeatBenefit::AbilityIncrease { options: vec![Intelligence], amount: 1 })
            .grants(FeatBenefit::Languages { count: 3 }),
        feat("elven-accuracy", "Elven Accuracy", "Increase DEX, INT, WIS or CHA by 1; reroll one die with advantage.")
            .requires(Prerequisite::Race { races: vec!["elf".to_string(), "half-elf".to_string()] })
            .grants(FeatBenefit::AbilityIncrease {
                options: vec![Dexterity, Intelligence, Wisdom, Charisma],
                amount: 1,
            }),
        feat("medium-armor-master", "Medium Armor Master", "Medium armor no longer imposes stealth disadvantage.")
            .requires(Prerequisite::Proficiency { proficiency: "medium".to_string() })
            .grants(FeatBenefit::ArmorClass { bonus: 1 }),
    ]
}

// ============================================================================
// Rule Systems
// ============================================================================

fn minimum(ability: Ability, minimum: u8) -> AbilityRequirement {
    AbilityRequirement::Minimum { ability, minimum }
}

pub(super) fn rule_systems() -> Vec<RuleSystem> {
    use Ability::*;

    let prerequisites: BTreeMap<String, Vec<AbilityRequirement>> = [
        ("barbarian", vec![minimum(Strength, 13)]),
        ("bard", vec![minimum(Charisma, 13)]),
        ("cleric", vec![minimum(Wisdom, 13)]),
        ("druid", vec![minimum(Wisdom, 13)]),
        (
            "fighter",
            vec![AbilityRequirement::AnyOf {
                options: vec![
                    AbilityMinimum { ability: Strength, minimum: 13 },
                    AbilityMinimum { ability: Dexterity, minimum: 13 },
                ],
            }],
        ),
        ("monk", vec![minimum(Dexterity, 13), minimum(Wisdom, 13)]),
        ("paladin", vec![minimum(Strength, 13), minimum(Charisma, 13)]),
        ("ranger", vec![minimum(Dexterity, 13), minimum(Wisdom, 13)]),
        ("rogue", vec![minimum(Dexterity, 13)]),
        ("sorcerer", vec![minimum(Charisma, 13)]),
        ("warlock", vec![minimum(Charisma, 13)]),
        ("wizard", vec![minimum(Intelligence, 13)]),
    ]
    .into_iter()
    .map(|(class, reqs)| (class.to_string(), reqs))
    .collect();

    vec![RuleSystem {
        id: "dnd5e".to_string(),
        name: "D&D 5th Edition (SRD)".to_string(),
        min_level: 1,
        max_level: 20,
        xp_thresholds: vec![
            0, 300, 900, 2_700, 6_500, 14_000, 23_000, 34_000, 48_000, 64_000, 85_000, 100_000,
            120_000, 140_000, 165_000, 195_000, 225_000, 265_000, 305_000, 355_000,
        ],
        allow_multiclassing: true,
        multiclass_prerequisites: prerequisites,
        formulas: BTreeMap::from([(
            "proficiency_bonus".to_string(),
            "floor((level-1)/4)+2".to_string(),
        )]),
        ability_cap: 20,
        asi_points: 2,
    }]
}

/// Skills recognized by feat and proficiency choices.
pub(super) fn skills() -> BTreeSet<&'static str> {
    BTreeSet::from([
        "acrobatics",
        "animal-handling",
        "arcana",
        "athletics",
        "deception",
        "history",
        "insight",
        "intimidation",
        "investigation",
        "medicine",
        "nature",
        "perception",
        "performance",
        "persuasion",
        "religion",
        "sleight-of-hand",
        "stealth",
        "survival",
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rage_uses_by_level() {
        let evaluator = crate::formula::FormulaEvaluator::new();
        let expected = [(1, 2), (2, 2), (3, 3), (5, 3), (6, 4), (11, 4), (12, 5), (16, 5), (17, 6), (20, 6)];
        for (level, uses) in expected {
            let vars = crate::formula::FormulaVars::for_level(level);
            assert_eq!(evaluator.evaluate(RAGE_USES, vars).unwrap(), uses, "level {level}");
        }
    }

    #[test]
    fn test_channel_divinity_uses_by_level() {
        let evaluator = crate::formula::FormulaEvaluator::new();
        for (level, uses) in [(2, 1), (5, 1), (6, 2), (17, 2), (18, 3), (20, 3)] {
            let vars = crate::formula::FormulaVars::for_level(level);
            assert_eq!(evaluator.evaluate(CHANNEL_DIVINITY_USES, vars).unwrap(), uses);
        }
    }

    #[test]
    fn test_half_caster_slots() {
        let slots = partial_caster_slots(2, 2);
        assert!(!slots.contains_key(&1));
        assert_eq!(slots[&2], vec![2]);
        assert_eq!(slots[&3], vec![3]);
        assert_eq!(slots[&5], vec![4, 2]);
        assert_eq!(slots[&20], vec![4, 3, 3, 3, 2]);
    }

    #[test]
    fn test_third_caster_slots() {
        let slots = partial_caster_slots(3, 3);
        assert_eq!(slots[&3], vec![2]);
        assert_eq!(slots[&7], vec![4, 2]);
        assert_eq!(slots[&20], vec![4, 3, 3, 1]);
    }

    #[test]
    fn test_known_tables() {
        assert_eq!(by_level(&[(1, 2), (4, 3), (10, 4)])[2], 2);
        assert_eq!(by_level(&[(1, 2), (4, 3), (10, 4)])[3], 3);
        assert_eq!(by_level(&[(3, 2), (10, 3)])[0], 0);
        assert_eq!(by_level(&[(1, 2), (4, 3), (10, 4)])[19], 4);
    }
}
