//! Prompt template for the story request.
//!
//! The template is plain data with four placeholders: `{name}`, `{gender}`,
//! `{age}` and `{topic}`.  Values are substituted verbatim in a single pass,
//! so text inside a substituted value is never expanded again.

use crate::validation::GenerationRequest;

/// Number of scenes the template asks the model for.
pub const REQUESTED_SCENES: usize = 14;

const PLACEHOLDERS: [&str; 4] = ["{name}", "{gender}", "{age}", "{topic}"];

const STORY_TEMPLATE: &str = r#"## Create an Original Children's Fairy Tale

Create an **original children's fairy tale** suitable for ages **2–7**, written entirely in **Bulgarian**, that can be turned into an illustrated book.

**Important:** The story should always include **magical elements, fantastical creatures, or enchanting worlds** to stimulate the child's imagination and provide rich, visually appealing scenes for illustration.

---

## Configuration

* **Main Character:** [{name} ({gender}), {age} years old]
* **Theme/Setting:** [{topic}]

---

## Response Format

**MANDATORY: Return the result in the following JSON format:**

{
  "bookTitle": "<book title>",
  "shortDescription": "<a short (2-3 sentences) motivational quote related to the book (not a direct message to the child)>",
  "motivationEnd": "<a short (2-3 sentences) motivational quote for the end of the book (not a direct message to the child)>",
  "scenes": [
    {
      "text": "<scene text - consider Technical requirements. New lines must be on a separate line (use \n\n for a new line)>"
    }
  ]
}

---

## Technical Requirements

* **14 scenes** (one per A5 page)
* **Progressive length:** 3–4 sentences at the beginning → 4–5 at the climax → 3–4 at the end
* **Total length:** 700–1200 words
* **Each scene easy to illustrate** with **hidden details** for re-reading
* Include **at least one magical or fantastical element per scene** (enchanted object, talking animal, magical landscape, mysterious sound, etc.)

---

## Stylistic Requirements

* **Warm, poetic language** with musicality
* **Simple, understandable words** without complex concepts
* **Smooth sentences** for easy read-aloud
* **Descriptive style** with a **magical feel**
* **NO descriptions of the appearance of [{name}]** (let the child imagine it)
* **Name the emotions**: "joyfully," "curiously," "proudly"

---

## Content Elements

* ✅ Adventure, discovery, and **magical transformation**
* ✅ Clearly named emotions and feelings
* ✅ Healthy coping strategies (deep breathing, asking for help, or similar)
* ✅ Friendship and mutual help
* ✅ Positive messages and life lessons
* ✅ Clear cause-and-effect relationships

---

## Structural Framework

### 1. INTRODUCTION (scenes 1–2)

* Present the hero in their familiar environment
* Show normal day/world with **named emotions**
* **Hint at the upcoming magical adventure**

### 2. DEVELOPMENT (scenes 3-10)

* The hero encounters a challenge or problem
* Use the **rule of three** — three attempts/obstacles
* Include magical helpers or enchanted friends
* Show emotional growth and coping strategies

### 3. CLIMAX (scenes 11-12)

* Peak magical moment with courage, wisdom, or kindness
* Most exciting magical event of the story
* Learn an important lesson with **clearly named emotions**

### 4. RESOLUTION (scenes 13-14)

* Problem solved with **positive magical resolution**
* Hero has changed/learned something
* Warm, soothing ending with **positive emotions**

---

## Flow and Consistency Rules

* **Every scene (except the first) must begin with an element connecting it to the previous scene**
* Show time passing naturally ("Next morning…," "After an hour…," etc.)
* Maintain a **logical sequence of magical events**

---

## Engagement Techniques

* **Repetitions:** "Тррр-тррр…," or similar
* **Magical recurring phrase:** "И тогава се случи нещо вълшебно…" or similar
* **Onomatopoeia and rhythm:** "Ооо-ооо," "Шшшш," etc.
* **Hidden visual details** in every scene for illustration

---

## Sensory Descriptions

* Use **colors, sounds, textures, smells, and temperatures** to bring magical worlds to life
* Emphasize **contrasts**: warm golden glow vs. cool moonlight, soft moss vs. sparkling crystal paths

---

## Visual Guidelines for the Illustrator

* **Angles:** multiple points of view
* **Hidden elements** for re-reading
* **Color palette:** warm for positive moments, cooler for challenges
* **Size and scale:** giant magical creatures vs. small hero
* **Emotion through gestures and setting**

---

## Important Reminders

* ❗ **DO NOT describe [{name}]'s appearance**
* ❗ **Each scene must have visual potential for illustration**
* ❗ **Maintain a positive tone — avoid scary/distressing elements**
* ❗ **Include magical worlds, creatures, or objects in every section**
* ❗ **Name emotions clearly**
* ❗ **Show healthy ways of coping**
* ❗ **Each scene must flow smoothly and logically**

---

## Final Checklist

* [ ] 14 scenes with progressive length (3–4 → 4–5 → 3–4 sentences)
* [ ] 700–1200 total words
* [ ] Magical worlds/creatures/objects woven throughout
* [ ] Positive message with healthy coping strategies
* [ ] Each scene suitable for illustration and re-reading
* [ ] JSON response format
"#;

pub fn build_prompt(req: &GenerationRequest) -> String {
    let age = req.age().to_string();
    render(STORY_TEMPLATE, |placeholder| match placeholder {
        "{name}" => req.name(),
        "{gender}" => req.gender().as_str(),
        "{age}" => age.as_str(),
        _ => req.topic(),
    })
}

fn render<'a>(template: &str, value_for: impl Fn(&str) -> &'a str) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match PLACEHOLDERS.iter().find(|p| tail.starts_with(**p)) {
            Some(&placeholder) => {
                out.push_str(value_for(placeholder));
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
